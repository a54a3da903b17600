//! Built-in template generator and local deployer

use chrono::Utc;

use crate::config::{is_hex_color, BrandConfig};
use crate::error::{Error, Result};
use crate::types::{
    ColorScheme, GeneratedSiteConfig, HeroContent, IntakeSession, IntakeStep, ServiceItem,
    SiteContent,
};

use super::{SiteDeployer, SiteGenerator};

const MAX_SERVICES: usize = 8;
const MAX_SUBHEADLINE_CHARS: usize = 160;

/// Templates and the industry keywords that select them, checked in order
const TEMPLATES: &[(&str, &[&str], &str)] = &[
    (
        "hospitality",
        &["restaurant", "cafe", "café", "coffee", "bakery", "bar", "catering", "hotel", "food"],
        "Reserve a table",
    ),
    (
        "wellness",
        &["salon", "spa", "yoga", "fitness", "gym", "massage", "health", "dental", "clinic", "therap"],
        "Book an appointment",
    ),
    (
        "trades",
        &["plumb", "electric", "roof", "hvac", "landscap", "construct", "contractor", "clean", "repair"],
        "Request a free quote",
    ),
    (
        "professional",
        &["law", "legal", "account", "consult", "financ", "insurance", "real estate", "agency"],
        "Schedule a consultation",
    ),
    (
        "retail",
        &["shop", "store", "boutique", "retail", "florist", "flower", "gift"],
        "Shop now",
    ),
];

const DEFAULT_TEMPLATE: (&str, &str) = ("classic", "Get in touch");

const NAMED_COLORS: &[(&str, &str)] = &[
    ("blue", "#2563eb"),
    ("navy", "#1e3a8a"),
    ("green", "#16a34a"),
    ("red", "#dc2626"),
    ("orange", "#ea580c"),
    ("yellow", "#eab308"),
    ("gold", "#ca8a04"),
    ("purple", "#7c3aed"),
    ("pink", "#db2777"),
    ("teal", "#0d9488"),
    ("brown", "#92400e"),
    ("black", "#111827"),
    ("gray", "#6b7280"),
    ("grey", "#6b7280"),
];

/// Offline generator that fills a fixed template from the intake answers.
///
/// Output depends only on the answers and the brand palette, apart from
/// `generated_at`.
#[derive(Debug, Clone, Default)]
pub struct TemplateSiteGenerator {
    brand: BrandConfig,
}

impl TemplateSiteGenerator {
    pub fn new(brand: BrandConfig) -> Self {
        Self { brand }
    }

    fn color_scheme(&self, branding: &str) -> ColorScheme {
        let mut scheme = self.brand.color_scheme();
        let picked = pick_colors(branding);
        let slots = [
            &mut scheme.primary,
            &mut scheme.secondary,
            &mut scheme.accent,
        ];
        for (slot, color) in slots.into_iter().zip(picked) {
            *slot = color;
        }
        scheme
    }
}

impl SiteGenerator for TemplateSiteGenerator {
    fn name(&self) -> &str {
        "template"
    }

    fn generate(&self, session: &IntakeSession) -> Result<GeneratedSiteConfig> {
        let answer = |step: IntakeStep| {
            session
                .answer_for(step)
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| Error::GenerationFailure(format!("missing answer for {}", step)))
        };

        let name = answer(IntakeStep::BusinessName)?;
        let industry = answer(IntakeStep::Industry)?;
        let services = answer(IntakeStep::Services)?;
        let branding = answer(IntakeStep::Branding)?;
        let content = answer(IntakeStep::Content)?;

        let (template_id, call_to_action) = pick_template(industry);

        tracing::debug!(
            session_id = %session.id,
            template = template_id,
            "Filling site template"
        );

        Ok(GeneratedSiteConfig {
            template_id: template_id.to_string(),
            color_scheme: self.color_scheme(branding),
            content: SiteContent {
                hero: HeroContent {
                    headline: name.to_string(),
                    subheadline: first_sentence(content),
                },
                services: split_services(services),
                testimonials: Vec::new(),
                call_to_action: call_to_action.to_string(),
            },
            deployment_url: None,
            generated_at: Utc::now(),
        })
    }
}

fn pick_template(industry: &str) -> (&'static str, &'static str) {
    let industry = industry.to_lowercase();
    TEMPLATES
        .iter()
        .find(|(_, keywords, _)| keywords.iter().any(|k| industry.contains(k)))
        .map(|(id, _, cta)| (*id, *cta))
        .unwrap_or(DEFAULT_TEMPLATE)
}

/// Hex codes and known color names, in the order they appear
fn pick_colors(branding: &str) -> Vec<String> {
    branding
        .split(|c: char| !(c.is_alphanumeric() || c == '#'))
        .filter_map(|word| {
            if is_hex_color(word) {
                Some(word.to_lowercase())
            } else {
                let word = word.to_lowercase();
                NAMED_COLORS
                    .iter()
                    .find(|(name, _)| *name == word)
                    .map(|(_, hex)| hex.to_string())
            }
        })
        .take(3)
        .collect()
}

fn split_services(services: &str) -> Vec<ServiceItem> {
    services
        .split([',', ';', '\n'])
        .map(str::trim)
        .map(|s| s.strip_prefix("and ").unwrap_or(s).trim())
        .filter(|s| !s.is_empty())
        .take(MAX_SERVICES)
        .map(|s| ServiceItem {
            name: capitalize(s),
            description: None,
        })
        .collect()
}

fn first_sentence(content: &str) -> String {
    let end = content
        .char_indices()
        .find(|(i, c)| {
            matches!(c, '.' | '!' | '?')
                && content[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(content.len());

    let sentence = content[..end].trim();
    if sentence.chars().count() <= MAX_SUBHEADLINE_CHARS {
        sentence.to_string()
    } else {
        crate::format::truncate(sentence, MAX_SUBHEADLINE_CHARS)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Turn a business name into a DNS-safe label.
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_end_matches('-').chars().take(48).collect();
    slug.trim_end_matches('-').to_string()
}

/// Deployer that assigns each site a subdomain without contacting a host.
#[derive(Debug, Clone)]
pub struct LocalDeployer {
    domain: String,
}

impl LocalDeployer {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

impl SiteDeployer for LocalDeployer {
    fn name(&self) -> &str {
        "local"
    }

    fn deploy(&self, session: &IntakeSession, site: &GeneratedSiteConfig) -> Result<String> {
        let mut slug = slugify(&site.content.hero.headline);
        if slug.is_empty() {
            slug = format!("site-{}", crate::format::short_id(&session.id));
        }
        Ok(format!("https://{}.{}", slug, self.domain.trim_matches('.')))
    }
}

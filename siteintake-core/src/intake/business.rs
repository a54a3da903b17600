//! Materializing a [`BusinessInfo`] from a completed intake

use chrono::Utc;

use crate::types::{BusinessInfo, ContactInfo, IntakeSession, IntakeStep, SocialLink};

/// Social platforms recognized in free-text answers: (domain, platform)
const SOCIAL_PLATFORMS: &[(&str, &str)] = &[
    ("facebook.com", "facebook"),
    ("instagram.com", "instagram"),
    ("linkedin.com", "linkedin"),
    ("tiktok.com", "tiktok"),
    ("x.com", "x"),
    ("twitter.com", "x"),
    ("yelp.com", "yelp"),
    ("youtube.com", "youtube"),
];

impl BusinessInfo {
    /// Build the business record from a session's answers.
    ///
    /// Returns `None` when the required name, industry or description
    /// answers are missing. Contact details and social links are picked out
    /// of every answer on a best-effort basis.
    pub fn from_intake(session: &IntakeSession) -> Option<Self> {
        let name = non_empty(session.answer_for(IntakeStep::BusinessName))?;
        let industry = non_empty(session.answer_for(IntakeStep::Industry))?;
        let description = non_empty(session.answer_for(IntakeStep::Content))
            .or_else(|| non_empty(session.answer_for(IntakeStep::Services)))?;

        let mut contact = ContactInfo::default();
        let mut social_links: Vec<SocialLink> = Vec::new();

        let words = session
            .responses
            .iter()
            .flat_map(|r| r.answer.split_whitespace())
            .map(|w| w.trim_matches(|c: char| matches!(c, ',' | ';' | '(' | ')' | '!' | '?')))
            .map(|w| w.trim_end_matches('.'));

        for word in words {
            if let Some(platform) = social_platform(word) {
                if !social_links.iter().any(|l| l.url == word) {
                    social_links.push(SocialLink {
                        platform: platform.to_string(),
                        url: word.to_string(),
                    });
                }
            } else if contact.email.is_none() && looks_like_email(word) {
                contact.email = Some(word.to_string());
            } else if contact.website.is_none() && is_link(word) {
                contact.website = Some(word.to_string());
            } else if contact.phone.is_none() && looks_like_phone(word) {
                contact.phone = Some(word.to_string());
            }
        }

        let now = Utc::now();
        Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            industry,
            description,
            address: None,
            contact: (!contact.is_empty()).then_some(contact),
            hours: None,
            social_links,
            created_at: now,
            updated_at: now,
        })
    }
}

fn non_empty(answer: Option<&str>) -> Option<String> {
    answer
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}

fn social_platform(word: &str) -> Option<&'static str> {
    if !is_link(word) {
        return None;
    }
    let host = word
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .split('/')
        .next()
        .unwrap_or_default();
    SOCIAL_PLATFORMS
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{}", domain)))
        .map(|(_, platform)| *platform)
}

fn is_link(word: &str) -> bool {
    word.starts_with("http://") || word.starts_with("https://") || word.starts_with("www.")
}

fn looks_like_email(word: &str) -> bool {
    match word.split_once('@') {
        Some((user, domain)) => !user.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

/// Digits in groups separated by `-` or `.`, optionally led by `+`
fn looks_like_phone(word: &str) -> bool {
    let number = word.strip_prefix('+').unwrap_or(word);
    if !number
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | '.'))
    {
        return false;
    }

    let groups: Vec<usize> = number
        .split(['-', '.'])
        .filter(|group| !group.is_empty())
        .map(str::len)
        .collect();
    let digits: usize = groups.iter().sum();
    (7..=15).contains(&digits) && !looks_like_date(&groups)
}

/// Group lengths of a year-first or year-last date (2024-01-15, 15.01.2024)
fn looks_like_date(groups: &[usize]) -> bool {
    match groups {
        [4, month, day] | [day, month, 4] => *month <= 2 && *day <= 2,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_session(content: &str) -> IntakeSession {
        let mut session = IntakeSession::new();
        let answers = [
            "I need more customers",
            "Acme Plumbing",
            "Plumbing",
            "Drain cleaning, water heaters",
            "Blue and white",
            content,
        ];
        for (step, answer) in IntakeStep::REQUIRED.into_iter().zip(answers) {
            session.record_response(step, "q", answer).unwrap();
        }
        session
    }

    #[test]
    fn test_business_from_intake() {
        let session = completed_session(
            "Family owned since 1990. Call 555-123-4567 or email hello@acme.test. \
             Find us at https://instagram.com/acmeplumbing and www.acme.test",
        );
        let business = BusinessInfo::from_intake(&session).unwrap();

        assert_eq!(business.name, "Acme Plumbing");
        assert_eq!(business.industry, "Plumbing");
        assert!(business.description.starts_with("Family owned"));

        let contact = business.contact.unwrap();
        assert_eq!(contact.email.as_deref(), Some("hello@acme.test"));
        assert_eq!(contact.phone.as_deref(), Some("555-123-4567"));
        assert_eq!(contact.website.as_deref(), Some("www.acme.test"));

        assert_eq!(business.social_links.len(), 1);
        assert_eq!(business.social_links[0].platform, "instagram");
    }

    #[test]
    fn test_business_without_contact_details() {
        let session = completed_session("We show up on time.");
        let business = BusinessInfo::from_intake(&session).unwrap();
        assert!(business.contact.is_none());
        assert!(business.social_links.is_empty());
    }

    #[test]
    fn test_dates_are_not_phone_numbers() {
        let session = completed_session(
            "Open since 2024-01-15. Renovated 03.06.2025, call +1-555-010-9999",
        );
        let contact = BusinessInfo::from_intake(&session).unwrap().contact.unwrap();
        assert_eq!(contact.phone.as_deref(), Some("+1-555-010-9999"));

        let session = completed_session("Serving the valley since 2024-01-15.");
        assert!(BusinessInfo::from_intake(&session).unwrap().contact.is_none());

        assert!(looks_like_phone("5551234567"));
        assert!(looks_like_phone("555.123.4567"));
        assert!(!looks_like_phone("15-01-2024"));
        assert!(!looks_like_phone("1-800-FLOWERS"));
        assert!(!looks_like_phone("12345"));
    }

    #[test]
    fn test_business_requires_name() {
        let session = IntakeSession::new();
        assert!(BusinessInfo::from_intake(&session).is_none());
    }
}

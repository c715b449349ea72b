//! Starter set of automated response rules

use parley_shared::{parse_keywords, NewRule, TriggerType};

use crate::store::RuleStore;

fn rule(
    name: &str,
    trigger_type: TriggerType,
    keywords: &str,
    response_message: &str,
    priority: i32,
    delay_seconds: u32,
) -> NewRule {
    NewRule {
        name: name.to_string(),
        trigger_type,
        keywords: parse_keywords(keywords),
        response_message: response_message.to_string(),
        is_active: true,
        priority,
        delay_seconds,
    }
}

/// Rules installed by `seed-default-responses` and on in-memory startup
pub fn default_rules() -> Vec<NewRule> {
    vec![
        rule(
            "Welcome Message",
            TriggerType::FirstMessage,
            "",
            "Thanks for reaching out! A member of our team will be with you shortly. \
             In the meantime, feel free to tell us more about what you need.",
            100,
            1,
        ),
        rule(
            "Greeting Response",
            TriggerType::Greeting,
            "",
            "Hello! How can we help you today?",
            90,
            0,
        ),
        rule(
            "Support Hours",
            TriggerType::Keyword,
            "hours, open, available, when",
            "Our support team is available Monday to Friday, 9:00 to 17:00.",
            85,
            0,
        ),
        rule(
            "Pricing Information",
            TriggerType::Keyword,
            "price, pricing, cost, plan, subscription",
            "You can find all of our plans and prices on the pricing page. \
             Let us know if you have questions about a specific plan.",
            80,
            0,
        ),
        rule(
            "Refund Policy",
            TriggerType::Keyword,
            "refund, money back, cancel",
            "Refunds are available within 30 days of purchase. \
             Share your order number and we will look into it.",
            75,
            0,
        ),
        rule(
            "Technical Issue",
            TriggerType::Keyword,
            "bug, error, broken, not working, crash",
            "Sorry you are running into trouble. Could you describe what you were \
             doing when the problem happened, and include any error message you saw?",
            70,
            0,
        ),
        rule(
            "Staff Offline",
            TriggerType::Offline,
            "",
            "Nobody from our team is online right now. Leave a message and we will \
             reply as soon as we are back.",
            60,
            2,
        ),
        rule(
            "Outside Business Hours",
            TriggerType::BusinessHours,
            "",
            "You have reached us outside business hours. We will get back to you \
             on the next business day.",
            50,
            2,
        ),
    ]
}

/// Install any missing default rule. Returns how many were created.
pub async fn install_default_rules(rules: &dyn RuleStore) -> parley_shared::ChatResult<usize> {
    let mut created = 0;
    for new_rule in default_rules() {
        let name = new_rule.name.clone();
        let (_, was_created) = rules.ensure_rule(new_rule).await?;
        if was_created {
            created += 1;
            tracing::info!(rule = %name, "Installed default automated response");
        } else {
            tracing::debug!(rule = %name, "Default automated response already present");
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_default_rule_names_are_unique() {
        let rules = default_rules();
        let mut names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), rules.len());
    }

    #[test]
    fn test_keyword_rules_have_keywords() {
        assert!(default_rules()
            .iter()
            .filter(|r| r.trigger_type == TriggerType::Keyword)
            .all(|r| !r.keywords.is_empty()));
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let store = MemoryStore::new();
        let created = install_default_rules(&store).await.unwrap();
        assert_eq!(created, default_rules().len());
        assert_eq!(install_default_rules(&store).await.unwrap(), 0);
    }
}

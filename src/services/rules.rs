// src/services/rules.rs
//
// Parte pura do avaliador: filtros, agrupamento e textos das tarefas.

use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::models::activities::{
    CharacteristicMatchConfig, ContactOwnerRow, ContactProfile, CriticalActivity, FilterOperator,
    FilterType, RuleMatch,
};

fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// O contato satisfaz o filtro de característica?
pub fn characteristic_matches(filter: &CharacteristicMatchConfig, profile: &ContactProfile) -> bool {
    let has = match filter.filter_type {
        FilterType::Product => match uuid::Uuid::parse_str(filter.value.trim()) {
            Ok(product_id) => profile.product_ids.contains(&product_id),
            Err(_) => return false,
        },
        FilterType::GoalType => profile.goal_types.iter().any(|g| same_text(g, &filter.value)),
        FilterType::MaritalStatus => profile
            .marital_status
            .as_deref()
            .is_some_and(|v| same_text(v, &filter.value)),
        FilterType::Gender => profile.gender.as_deref().is_some_and(|v| same_text(v, &filter.value)),
    };

    match filter.operator() {
        FilterOperator::Equals | FilterOperator::Has => has,
        FilterOperator::NotHas => !has,
    }
}

/// Um match por responsável (sem contato). A descrição conta os contatos
/// distintos e lista seus nomes em ordem alfabética.
pub fn group_by_owner<'a>(profiles: impl IntoIterator<Item = &'a ContactProfile>) -> Vec<RuleMatch> {
    let mut per_owner: BTreeMap<Uuid, BTreeMap<Uuid, &str>> = BTreeMap::new();
    for profile in profiles {
        per_owner
            .entry(profile.owner_id)
            .or_default()
            .insert(profile.contact_id, profile.full_name.as_str());
    }

    per_owner
        .into_iter()
        .map(|(owner_id, contacts)| {
            let mut names: Vec<&str> = contacts.into_values().collect();
            names.sort_unstable();
            let count = match names.len() {
                1 => "1 contato atende ao critério".to_string(),
                n => format!("{} contatos atendem ao critério", n),
            };
            RuleMatch {
                assignee_id: owner_id,
                contact_id: None,
                contact_name: None,
                detail: Some(format!("{}: {}", count, names.join(", "))),
            }
        })
        .collect()
}

/// Um match por (responsável, contato), sem repetições.
pub fn contact_matches(rows: Vec<ContactOwnerRow>) -> Vec<RuleMatch> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert((row.owner_id, row.contact_id)))
        .map(|row| RuleMatch {
            assignee_id: row.owner_id,
            contact_id: Some(row.contact_id),
            contact_name: Some(row.full_name),
            detail: row.detail,
        })
        .collect()
}

/// Recorrência manual: um match por responsável atribuído, ou por usuário ativo
/// quando a regra não tem atribuições.
pub fn recurrence_matches(assignees: &[Uuid], active_users: &[Uuid]) -> Vec<RuleMatch> {
    let targets = if assignees.is_empty() { active_users } else { assignees };
    let mut seen = HashSet::new();
    targets
        .iter()
        .filter(|id| seen.insert(**id))
        .map(|id| RuleMatch { assignee_id: *id, contact_id: None, contact_name: None, detail: None })
        .collect()
}

/// Com atribuições, só ficam os matches de responsáveis atribuídos.
pub fn restrict_to_assignees(matches: Vec<RuleMatch>, assignees: &[Uuid]) -> Vec<RuleMatch> {
    if assignees.is_empty() {
        return matches;
    }
    matches
        .into_iter()
        .filter(|m| assignees.contains(&m.assignee_id))
        .collect()
}

pub fn task_title(activity: &CriticalActivity, rule_match: &RuleMatch) -> String {
    match &rule_match.contact_name {
        Some(name) => format!("{}: {}", activity.title, name),
        None => activity.title.clone(),
    }
}

pub fn task_description(activity: &CriticalActivity, rule_match: &RuleMatch) -> Option<String> {
    match (activity.description.as_deref(), rule_match.detail.as_deref()) {
        (Some(d), Some(detail)) => Some(format!("{}\n\n{}", d, detail)),
        (Some(d), None) => Some(d.to_string()),
        (None, Some(detail)) => Some(detail.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::activities::RuleType;
    use chrono::Utc;
    use serde_json::json;
    use sqlx::types::Json;

    fn profile(owner: Uuid) -> ContactProfile {
        ContactProfile {
            contact_id: Uuid::new_v4(),
            owner_id: owner,
            full_name: "Maria da Silva".into(),
            marital_status: Some("Casado".into()),
            gender: Some("feminino".into()),
            goal_types: vec!["aposentadoria".into()],
            product_ids: vec![],
        }
    }

    fn filter(filter_type: FilterType, operator: Option<FilterOperator>, value: &str) -> CharacteristicMatchConfig {
        CharacteristicMatchConfig { filter_type, operator, value: value.into() }
    }

    #[test]
    fn marital_status_equals_ignores_case_and_spaces() {
        let p = profile(Uuid::new_v4());
        assert!(characteristic_matches(&filter(FilterType::MaritalStatus, None, " casado "), &p));
        assert!(!characteristic_matches(&filter(FilterType::MaritalStatus, None, "solteiro"), &p));
    }

    #[test]
    fn missing_attribute_never_equals() {
        let mut p = profile(Uuid::new_v4());
        p.gender = None;
        assert!(!characteristic_matches(&filter(FilterType::Gender, None, "feminino"), &p));
    }

    #[test]
    fn goal_type_has_and_not_has() {
        let p = profile(Uuid::new_v4());
        assert!(characteristic_matches(&filter(FilterType::GoalType, None, "Aposentadoria"), &p));
        assert!(!characteristic_matches(
            &filter(FilterType::GoalType, Some(FilterOperator::NotHas), "aposentadoria"),
            &p
        ));
        assert!(characteristic_matches(
            &filter(FilterType::GoalType, Some(FilterOperator::NotHas), "sucessao"),
            &p
        ));
    }

    #[test]
    fn product_filter_checks_active_contract_products() {
        let product = Uuid::new_v4();
        let mut p = profile(Uuid::new_v4());
        let f = filter(FilterType::Product, Some(FilterOperator::NotHas), &product.to_string());
        assert!(characteristic_matches(&f, &p));

        p.product_ids.push(product);
        assert!(!characteristic_matches(&f, &p));
        assert!(characteristic_matches(&filter(FilterType::Product, None, &product.to_string()), &p));
    }

    #[test]
    fn grouping_yields_one_match_per_owner() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut joana = profile(a);
        joana.full_name = "Joana Prado".into();
        let profiles = vec![profile(a), profile(b), joana];

        let matches = group_by_owner(&profiles);

        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.contact_id.is_none()));
        let for_a = matches.iter().find(|m| m.assignee_id == a).unwrap();
        assert_eq!(
            for_a.detail.as_deref(),
            Some("2 contatos atendem ao critério: Joana Prado, Maria da Silva")
        );
        let for_b = matches.iter().find(|m| m.assignee_id == b).unwrap();
        assert_eq!(for_b.detail.as_deref(), Some("1 contato atende ao critério: Maria da Silva"));
    }

    #[test]
    fn grouping_counts_each_contact_once() {
        let owner = Uuid::new_v4();
        let p = profile(owner);

        let matches = group_by_owner([&p, &p]);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].detail.as_deref(), Some("1 contato atende ao critério: Maria da Silva"));
    }

    #[test]
    fn contact_matches_drop_duplicates() {
        let owner = Uuid::new_v4();
        let contact = Uuid::new_v4();
        let row = |detail: &str| ContactOwnerRow {
            contact_id: contact,
            owner_id: owner,
            full_name: "João".into(),
            detail: Some(detail.into()),
        };

        let matches = contact_matches(vec![row("Seguro"), row("Previdência")]);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key(), (owner, Some(contact)));
    }

    #[test]
    fn recurrence_falls_back_to_active_users() {
        let users = [Uuid::new_v4(), Uuid::new_v4()];
        assert_eq!(recurrence_matches(&[], &users).len(), 2);

        let assigned = [users[1]];
        let only = recurrence_matches(&assigned, &users);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].assignee_id, users[1]);
    }

    #[test]
    fn assignments_narrow_matches() {
        let kept = Uuid::new_v4();
        let dropped = Uuid::new_v4();
        let m = |id| RuleMatch { assignee_id: id, contact_id: None, contact_name: None, detail: None };

        assert_eq!(restrict_to_assignees(vec![m(kept), m(dropped)], &[]).len(), 2);
        let narrowed = restrict_to_assignees(vec![m(kept), m(dropped)], &[kept]);
        assert_eq!(narrowed, vec![m(kept)]);
    }

    #[test]
    fn task_texts_combine_rule_and_match() {
        let activity = CriticalActivity {
            id: Uuid::new_v4(),
            title: "Health score crítico".into(),
            description: Some("Ligar para o cliente".into()),
            rule_type: RuleType::LowHealthScore,
            rule_config: Json(json!({"threshold": 40})),
            is_perpetual: true,
            is_active: true,
            last_run_at: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let rule_match = RuleMatch {
            assignee_id: Uuid::new_v4(),
            contact_id: Some(Uuid::new_v4()),
            contact_name: Some("Maria".into()),
            detail: Some("Health score atual: 35".into()),
        };

        assert_eq!(task_title(&activity, &rule_match), "Health score crítico: Maria");
        assert_eq!(
            task_description(&activity, &rule_match).as_deref(),
            Some("Ligar para o cliente\n\nHealth score atual: 35")
        );
    }
}

// src/models/activities.rs

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::AppError;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "critical_activity_type")]
pub enum RuleType {
    #[sqlx(rename = "pagamento_atrasado")]
    #[serde(rename = "pagamento_atrasado")]
    OverduePayment,
    #[sqlx(rename = "health_score_critico")]
    #[serde(rename = "health_score_critico")]
    LowHealthScore,
    #[sqlx(rename = "contrato_vencendo")]
    #[serde(rename = "contrato_vencendo")]
    ExpiringContract,
    #[sqlx(rename = "recorrencia_manual")]
    #[serde(rename = "recorrencia_manual")]
    ManualRecurrence,
    #[sqlx(rename = "caracteristica_cliente")]
    #[serde(rename = "caracteristica_cliente")]
    CharacteristicMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceInterval {
    #[serde(alias = "diaria", alias = "diario")]
    Daily,
    #[serde(alias = "semanal")]
    Weekly,
    #[serde(alias = "mensal")]
    Monthly,
}

impl RecurrenceInterval {
    pub fn next_run_after(self, last_run: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            RecurrenceInterval::Daily => last_run + Duration::days(1),
            RecurrenceInterval::Weekly => last_run + Duration::days(7),
            RecurrenceInterval::Monthly => last_run
                .checked_add_months(Months::new(1))
                .unwrap_or(last_run + Duration::days(30)),
        }
    }

    /// Regras que nunca rodaram estão sempre vencidas.
    pub fn is_due(self, last_run_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_run_at {
            None => true,
            Some(last) => now >= self.next_run_after(last),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Product,
    MaritalStatus,
    Gender,
    GoalType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    Has,
    NotHas,
}

// --- Configuração tipada por tipo de regra ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LowHealthScoreConfig {
    #[schema(example = 40)]
    pub threshold: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExpiringContractConfig {
    #[schema(example = 30)]
    pub days_before: i64,
    #[schema(example = "seguro")]
    pub product_category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ManualRecurrenceConfig {
    pub interval: RecurrenceInterval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CharacteristicMatchConfig {
    pub filter_type: FilterType,
    /// Opcional na entrada; sempre preenchido depois do parse.
    pub operator: Option<FilterOperator>,
    #[schema(example = "casado")]
    pub value: String,
}

impl CharacteristicMatchConfig {
    pub fn operator(&self) -> FilterOperator {
        match (self.operator, self.filter_type) {
            (Some(op), _) => op,
            (None, FilterType::Product | FilterType::GoalType) => FilterOperator::Has,
            (None, FilterType::MaritalStatus | FilterType::Gender) => FilterOperator::Equals,
        }
    }
}

/// `rule_type` + `rule_config` do banco, já validados. Um variante por tipo de regra.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleConfig {
    OverduePayment,
    LowHealthScore(LowHealthScoreConfig),
    ExpiringContract(ExpiringContractConfig),
    ManualRecurrence(ManualRecurrenceConfig),
    CharacteristicMatch(CharacteristicMatchConfig),
}

fn invalid(reason: impl ToString) -> AppError {
    AppError::InvalidRuleConfig(reason.to_string())
}

impl RuleConfig {
    pub fn parse(rule_type: RuleType, config: &Value) -> Result<Self, AppError> {
        let parsed = match rule_type {
            RuleType::OverduePayment => RuleConfig::OverduePayment,
            RuleType::LowHealthScore => {
                let c: LowHealthScoreConfig = serde_json::from_value(config.clone()).map_err(invalid)?;
                if !(0..=100).contains(&c.threshold) {
                    return Err(invalid("threshold deve estar entre 0 e 100"));
                }
                RuleConfig::LowHealthScore(c)
            }
            RuleType::ExpiringContract => {
                let c: ExpiringContractConfig = serde_json::from_value(config.clone()).map_err(invalid)?;
                if c.days_before < 0 {
                    return Err(invalid("days_before não pode ser negativo"));
                }
                if c.product_category.trim().is_empty() {
                    return Err(invalid("product_category é obrigatório"));
                }
                RuleConfig::ExpiringContract(c)
            }
            RuleType::ManualRecurrence => {
                RuleConfig::ManualRecurrence(serde_json::from_value(config.clone()).map_err(invalid)?)
            }
            RuleType::CharacteristicMatch => {
                let mut c: CharacteristicMatchConfig =
                    serde_json::from_value(config.clone()).map_err(invalid)?;
                let operator = c.operator();
                let allowed = match c.filter_type {
                    FilterType::Product | FilterType::GoalType => {
                        matches!(operator, FilterOperator::Has | FilterOperator::NotHas)
                    }
                    FilterType::MaritalStatus | FilterType::Gender => operator == FilterOperator::Equals,
                };
                if !allowed {
                    return Err(invalid(format!(
                        "operador {:?} não se aplica a {:?}",
                        operator, c.filter_type
                    )));
                }
                if c.value.trim().is_empty() {
                    return Err(invalid("value é obrigatório"));
                }
                if c.filter_type == FilterType::Product && Uuid::parse_str(c.value.trim()).is_err() {
                    return Err(invalid("value deve ser o ID do produto"));
                }
                c.operator = Some(operator);
                RuleConfig::CharacteristicMatch(c)
            }
        };

        Ok(parsed)
    }

    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleConfig::OverduePayment => RuleType::OverduePayment,
            RuleConfig::LowHealthScore(_) => RuleType::LowHealthScore,
            RuleConfig::ExpiringContract(_) => RuleType::ExpiringContract,
            RuleConfig::ManualRecurrence(_) => RuleType::ManualRecurrence,
            RuleConfig::CharacteristicMatch(_) => RuleType::CharacteristicMatch,
        }
    }

    /// JSON normalizado para gravar em `rule_config`.
    pub fn to_json(&self) -> Value {
        let value = match self {
            RuleConfig::OverduePayment => Ok(json!({})),
            RuleConfig::LowHealthScore(c) => serde_json::to_value(c),
            RuleConfig::ExpiringContract(c) => serde_json::to_value(c),
            RuleConfig::ManualRecurrence(c) => serde_json::to_value(c),
            RuleConfig::CharacteristicMatch(c) => serde_json::to_value(c),
        };
        value.unwrap_or_else(|_| json!({}))
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CriticalActivity {
    pub id: Uuid,
    #[schema(example = "Cliente com health score crítico")]
    pub title: String,
    #[schema(example = "Ligar para entender o momento do cliente")]
    pub description: Option<String>,
    pub rule_type: RuleType,
    #[schema(value_type = Object, example = json!({"threshold": 40}))]
    pub rule_config: Json<Value>,
    pub is_perpetual: bool,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CriticalActivity {
    pub fn config(&self) -> Result<RuleConfig, AppError> {
        RuleConfig::parse(self.rule_type, &self.rule_config.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTrigger {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub user_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// O que o avaliador faz com um match, dado o gatilho existente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerDecision {
    /// Nenhum gatilho: cria gatilho + tarefa
    Create,
    /// Gatilho resolvido: re-arma + nova tarefa
    Rearm,
    /// Gatilho ainda aberto: nada a fazer
    Skip,
}

impl TriggerDecision {
    pub fn for_existing(existing: Option<&ActivityTrigger>) -> Self {
        match existing {
            None => TriggerDecision::Create,
            Some(t) if t.resolved_at.is_some() => TriggerDecision::Rearm,
            Some(_) => TriggerDecision::Skip,
        }
    }
}

/// Um par (responsável[, contato]) que satisfaz o predicado de uma regra.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    pub assignee_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub contact_name: Option<String>,
    /// Texto extra para a descrição da tarefa
    pub detail: Option<String>,
}

impl RuleMatch {
    pub fn key(&self) -> (Uuid, Option<Uuid>) {
        (self.assignee_id, self.contact_id)
    }
}

/// Linha vinda dos predicados baseados em contato.
#[derive(Debug, Clone, FromRow)]
pub struct ContactOwnerRow {
    pub contact_id: Uuid,
    pub owner_id: Uuid,
    pub full_name: String,
    pub detail: Option<String>,
}

/// Perfil do contato para a regra de característica.
#[derive(Debug, Clone, FromRow)]
pub struct ContactProfile {
    pub contact_id: Uuid,
    pub owner_id: Uuid,
    pub full_name: String,
    pub marital_status: Option<String>,
    pub gender: Option<String>,
    pub goal_types: Vec<String>,
    pub product_ids: Vec<Uuid>,
}

/// Resultado de uma regra numa rodada do avaliador.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRunReport {
    pub activity_id: Uuid,
    pub title: String,
    pub tasks_created: u32,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchPreview {
    #[serde(flatten)]
    pub rule_match: RuleMatch,
    pub decision: TriggerDecision,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 8, 0, 0).unwrap()
    }

    #[test]
    fn parses_health_score_config() {
        let config = RuleConfig::parse(RuleType::LowHealthScore, &json!({"threshold": 40})).unwrap();
        assert_eq!(config, RuleConfig::LowHealthScore(LowHealthScoreConfig { threshold: 40 }));
        assert_eq!(config.rule_type(), RuleType::LowHealthScore);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = RuleConfig::parse(RuleType::LowHealthScore, &json!({"threshold": 140})).unwrap_err();
        assert!(matches!(err, AppError::InvalidRuleConfig(_)));
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(RuleConfig::parse(RuleType::ExpiringContract, &json!({"days_before": 30})).is_err());
        assert!(RuleConfig::parse(RuleType::ManualRecurrence, &json!({})).is_err());
    }

    #[test]
    fn overdue_payment_ignores_config() {
        let config = RuleConfig::parse(RuleType::OverduePayment, &json!({"qualquer": 1})).unwrap();
        assert_eq!(config, RuleConfig::OverduePayment);
        assert_eq!(config.to_json(), json!({}));
    }

    #[test]
    fn recurrence_accepts_portuguese_aliases() {
        let config = RuleConfig::parse(RuleType::ManualRecurrence, &json!({"interval": "semanal"})).unwrap();
        assert_eq!(
            config,
            RuleConfig::ManualRecurrence(ManualRecurrenceConfig { interval: RecurrenceInterval::Weekly })
        );
    }

    #[test]
    fn characteristic_operator_defaults_by_filter_type() {
        let config = RuleConfig::parse(
            RuleType::CharacteristicMatch,
            &json!({"filter_type": "goal_type", "value": "aposentadoria"}),
        )
        .unwrap();
        let RuleConfig::CharacteristicMatch(c) = config else { panic!("variante errada") };
        assert_eq!(c.operator, Some(FilterOperator::Has));

        let config = RuleConfig::parse(
            RuleType::CharacteristicMatch,
            &json!({"filter_type": "gender", "value": "feminino"}),
        )
        .unwrap();
        let RuleConfig::CharacteristicMatch(c) = config else { panic!("variante errada") };
        assert_eq!(c.operator, Some(FilterOperator::Equals));
    }

    #[test]
    fn characteristic_rejects_operator_mismatch() {
        let err = RuleConfig::parse(
            RuleType::CharacteristicMatch,
            &json!({"filter_type": "marital_status", "operator": "not_has", "value": "casado"}),
        );
        assert!(err.is_err());

        let err = RuleConfig::parse(
            RuleType::CharacteristicMatch,
            &json!({"filter_type": "product", "operator": "has", "value": "não-é-uuid"}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn normalized_json_round_trips_through_parse() {
        let original = RuleConfig::parse(
            RuleType::ExpiringContract,
            &json!({"days_before": 15, "product_category": "previdencia"}),
        )
        .unwrap();
        let again = RuleConfig::parse(original.rule_type(), &original.to_json()).unwrap();
        assert_eq!(original, again);
    }

    #[test]
    fn never_run_recurrence_is_due() {
        assert!(RecurrenceInterval::Monthly.is_due(None, at(2024, 5, 1)));
    }

    #[test]
    fn daily_and_weekly_gating() {
        let last = at(2024, 5, 1);
        assert!(!RecurrenceInterval::Daily.is_due(Some(last), last + Duration::hours(23)));
        assert!(RecurrenceInterval::Daily.is_due(Some(last), last + Duration::days(1)));
        assert!(!RecurrenceInterval::Weekly.is_due(Some(last), at(2024, 5, 7)));
        assert!(RecurrenceInterval::Weekly.is_due(Some(last), at(2024, 5, 8)));
    }

    #[test]
    fn monthly_uses_calendar_months() {
        let last = at(2024, 1, 31);
        // 31/01 + 1 mês = 29/02 (ano bissexto)
        assert_eq!(RecurrenceInterval::Monthly.next_run_after(last), at(2024, 2, 29));
        assert!(!RecurrenceInterval::Monthly.is_due(Some(last), at(2024, 2, 28)));
    }

    fn trigger(resolved: bool) -> ActivityTrigger {
        ActivityTrigger {
            id: Uuid::new_v4(),
            activity_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            contact_id: None,
            task_id: Some(Uuid::new_v4()),
            triggered_at: at(2024, 1, 1),
            resolved_at: resolved.then(|| at(2024, 1, 5)),
        }
    }

    #[test]
    fn trigger_decision_follows_resolution_state() {
        assert_eq!(TriggerDecision::for_existing(None), TriggerDecision::Create);
        assert_eq!(TriggerDecision::for_existing(Some(&trigger(false))), TriggerDecision::Skip);
        assert_eq!(TriggerDecision::for_existing(Some(&trigger(true))), TriggerDecision::Rearm);
    }
}

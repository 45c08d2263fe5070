// src/models/contracts.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "contract_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Ended,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "billing_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Paid,
    Pending,
    Overdue,
    Canceled,
}

impl BillingStatus {
    /// Traduz o status de assinatura/fatura/cobrança do gateway de pagamento
    /// para o vocabulário do sistema. `None` para status desconhecidos.
    pub fn from_gateway(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "paid" | "active" | "captured" => Some(BillingStatus::Paid),
            "pending" | "processing" | "waiting" | "scheduled" => Some(BillingStatus::Pending),
            "overdue" | "past_due" | "rejected" | "unpaid" | "failed" => Some(BillingStatus::Overdue),
            "canceled" | "cancelled" | "expired" | "refunded" => Some(BillingStatus::Canceled),
            _ => None,
        }
    }

    pub const ALL: [BillingStatus; 4] = [
        BillingStatus::Paid,
        BillingStatus::Pending,
        BillingStatus::Overdue,
        BillingStatus::Canceled,
    ];

    /// Rótulo do enum `billing_status` no Postgres.
    pub fn as_str(self) -> &'static str {
        match self {
            BillingStatus::Paid => "paid",
            BillingStatus::Pending => "pending",
            BillingStatus::Overdue => "overdue",
            BillingStatus::Canceled => "canceled",
        }
    }

    /// Status que disparam a atividade de pagamento atrasado.
    pub fn is_delinquent(self) -> bool {
        matches!(self, BillingStatus::Overdue | BillingStatus::Canceled)
    }

    /// Rótulos dos status inadimplentes, no formato usado nas consultas.
    pub fn delinquent_labels() -> Vec<&'static str> {
        Self::ALL
            .into_iter()
            .filter(|s| s.is_delinquent())
            .map(BillingStatus::as_str)
            .collect()
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    #[schema(example = "Seguro de Vida Resgatável")]
    pub name: String,
    #[schema(example = "seguro")]
    pub category: String,
    /// Percentual de PB sobre o valor do contrato
    #[schema(example = "12.5")]
    pub pb_rate: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub opportunity_id: Option<Uuid>,
    pub product_id: Uuid,
    #[schema(example = "1500.00")]
    pub value: Decimal,
    pub status: ContractStatus,
    pub billing_status: BillingStatus,
    #[schema(value_type = String, format = Date, example = "2024-01-01")]
    pub start_date: NaiveDate,
    #[schema(value_type = Option<String>, format = Date, example = "2025-01-01")]
    pub end_date: Option<NaiveDate>,
    pub calculated_pb: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contrato + percentual do produto, para o recálculo de PB.
#[derive(Debug, Clone, FromRow)]
pub struct ContractCommissionInput {
    pub contract_id: Uuid,
    pub product_name: String,
    pub value: Decimal,
    pub pb_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthScoreSnapshot {
    pub id: Uuid,
    pub contact_id: Uuid,
    #[schema(example = 35)]
    pub score: i32,
    pub calculated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_statuses_map_into_local_vocabulary() {
        assert_eq!(BillingStatus::from_gateway("paid"), Some(BillingStatus::Paid));
        assert_eq!(BillingStatus::from_gateway("PAST_DUE"), Some(BillingStatus::Overdue));
        assert_eq!(BillingStatus::from_gateway("rejected"), Some(BillingStatus::Overdue));
        assert_eq!(BillingStatus::from_gateway(" cancelled "), Some(BillingStatus::Canceled));
        assert_eq!(BillingStatus::from_gateway("processing"), Some(BillingStatus::Pending));
        assert_eq!(BillingStatus::from_gateway("desconhecido"), None);
    }

    #[test]
    fn only_overdue_and_canceled_are_delinquent() {
        assert!(BillingStatus::Overdue.is_delinquent());
        assert!(BillingStatus::Canceled.is_delinquent());
        assert!(!BillingStatus::Paid.is_delinquent());
        assert!(!BillingStatus::Pending.is_delinquent());
        assert_eq!(BillingStatus::delinquent_labels(), vec!["overdue", "canceled"]);
    }

    #[test]
    fn labels_match_the_serialized_form() {
        for status in BillingStatus::ALL {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
        }
    }
}

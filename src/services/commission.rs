// src/services/commission.rs

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::contracts::ContractCommissionInput;

/// PB = valor × percentual / 100, arredondado em centavos.
pub fn calculate_pb(value: Decimal, pb_rate: Decimal) -> Decimal {
    (value * pb_rate / Decimal::ONE_HUNDRED).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Resultado do recálculo de um contrato.
#[derive(Debug, PartialEq)]
pub enum CommissionResult {
    Calculated(Decimal),
    /// Produto sem percentual: contrato fica como está
    MissingRate,
}

pub fn commission_for(input: &ContractCommissionInput) -> CommissionResult {
    match input.pb_rate {
        Some(rate) => CommissionResult::Calculated(calculate_pb(input.value, rate)),
        None => CommissionResult::MissingRate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn pb_is_percentage_of_value() {
        assert_eq!(calculate_pb(dec("1500.00"), dec("12.5")), dec("187.50"));
    }

    #[test]
    fn pb_rounds_half_away_from_zero() {
        // 333.33 × 1.5% = 4.99995
        assert_eq!(calculate_pb(dec("333.33"), dec("1.5")), dec("5.00"));
    }

    #[test]
    fn missing_rate_is_not_replaced_by_a_default() {
        let input = ContractCommissionInput {
            contract_id: Uuid::new_v4(),
            product_name: "Consórcio".into(),
            value: dec("1000"),
            pb_rate: None,
        };
        assert_eq!(commission_for(&input), CommissionResult::MissingRate);
    }
}

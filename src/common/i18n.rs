// src/common/i18n.rs

use std::collections::HashMap;

const DEFAULT_LANG: &str = "pt";

/// Mensagens de erro por idioma. Chave -> texto; `{0}` é substituído pelo argumento.
pub struct I18nStore {
    messages: HashMap<&'static str, HashMap<&'static str, &'static str>>,
}

impl I18nStore {
    pub fn new() -> Self {
        let pt: HashMap<&'static str, &'static str> = HashMap::from([
            ("validation_error", "Um ou mais campos são inválidos."),
            ("email_already_exists", "Este e-mail já está em uso."),
            ("invalid_credentials", "E-mail ou senha inválidos."),
            ("invalid_token", "Token de autenticação inválido ou ausente."),
            ("invalid_acting_user", "Cabeçalho X-Acting-User-Id inválido (não é um UUID)."),
            ("user_not_found", "Usuário não encontrado."),
            ("permission_denied", "Você precisa da permissão '{0}' para realizar esta ação."),
            ("resource_not_found", "{0} não encontrado(a)."),
            ("unique_violation", "Registro duplicado: {0}."),
            ("invalid_rule_config", "Configuração da atividade crítica inválida: {0}."),
            ("activity_inactive", "A atividade crítica está inativa."),
            ("unknown_billing_status", "Status de cobrança desconhecido: {0}."),
            ("transition_not_active", "Só é possível movimentar registros ativos."),
            ("transition_not_lost", "Só é possível reativar registros perdidos."),
            ("transition_same_stage", "O registro já está nesta etapa."),
            ("transition_incomplete_successor", "Informe funil e etapa de destino juntos."),
            ("transition_stage_outside_funnel", "A etapa informada não pertence ao funil."),
            ("transition_successor_not_supported", "Contatos não geram um novo registro ao serem ganhos."),
            ("transition_concurrent_update", "O registro foi alterado por outra operação. Atualize e tente novamente."),
            ("internal_error", "Ocorreu um erro inesperado."),
        ]);

        let en: HashMap<&'static str, &'static str> = HashMap::from([
            ("validation_error", "One or more fields are invalid."),
            ("email_already_exists", "This e-mail is already in use."),
            ("invalid_credentials", "Invalid e-mail or password."),
            ("invalid_token", "Missing or invalid authentication token."),
            ("invalid_acting_user", "Invalid X-Acting-User-Id header (not a valid UUID)."),
            ("user_not_found", "User not found."),
            ("permission_denied", "You need the '{0}' permission to perform this action."),
            ("resource_not_found", "{0} not found."),
            ("unique_violation", "Duplicate record: {0}."),
            ("invalid_rule_config", "Invalid critical activity configuration: {0}."),
            ("activity_inactive", "The critical activity is inactive."),
            ("unknown_billing_status", "Unknown billing status: {0}."),
            ("transition_not_active", "Only active records can be moved."),
            ("transition_not_lost", "Only lost records can be reactivated."),
            ("transition_same_stage", "The record is already at this stage."),
            ("transition_incomplete_successor", "Next funnel and next stage must be given together."),
            ("transition_stage_outside_funnel", "The stage does not belong to the funnel."),
            ("transition_successor_not_supported", "Contacts do not spawn a new record when won."),
            ("transition_concurrent_update", "The record was changed by another operation. Refresh and retry."),
            ("internal_error", "An unexpected error occurred."),
        ]);

        Self {
            messages: HashMap::from([("pt", pt), ("en", en)]),
        }
    }

    pub fn translate(&self, lang: &str, key: &str) -> String {
        self.messages
            .get(lang)
            .and_then(|m| m.get(key))
            .or_else(|| self.messages.get(DEFAULT_LANG).and_then(|m| m.get(key)))
            .map(|s| s.to_string())
            .unwrap_or_else(|| key.to_string())
    }
}

impl Default for I18nStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_known_language() {
        let store = I18nStore::new();
        assert_eq!(store.translate("en", "user_not_found"), "User not found.");
    }

    #[test]
    fn unknown_language_falls_back_to_portuguese() {
        let store = I18nStore::new();
        assert_eq!(store.translate("de", "user_not_found"), "Usuário não encontrado.");
    }

    #[test]
    fn every_portuguese_key_has_an_english_message() {
        let store = I18nStore::new();
        for key in store.messages["pt"].keys() {
            assert!(store.messages["en"].contains_key(key), "sem tradução em inglês: {key}");
        }
    }

    #[test]
    fn unknown_key_is_returned_as_is() {
        let store = I18nStore::new();
        assert_eq!(store.translate("pt", "nao_existe"), "nao_existe");
    }
}

// src/common/db_utils.rs

use sqlx::PgConnection;

use crate::common::error::AppError;
use crate::middleware::acting::Actor;

// ---
// Contexto do ator para o banco
// ---
/// Define `app.user_id` (usuário efetivo) e `app.actor_id` (quem está logado)
/// na transação corrente, para políticas e auditoria do lado do banco.
/// `is_local = true`: vale só até o fim da transação.
pub(crate) async fn set_actor_context(
    conn: &mut PgConnection,
    actor: &Actor,
) -> Result<(), AppError> {
    sqlx::query("SELECT set_config('app.user_id', $1, true)")
        .bind(actor.effective_user_id().to_string())
        .execute(&mut *conn)
        .await?;

    sqlx::query("SELECT set_config('app.actor_id', $1, true)")
        .bind(actor.user_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

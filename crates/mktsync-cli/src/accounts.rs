//! Account inspection commands.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use mktsync_db::AccountStatusRow;

#[derive(Debug, Subcommand)]
pub enum AccountsCommands {
    /// List accounts with their credential state (tokens are never shown)
    List {
        #[arg(long)]
        owner: Option<String>,
    },
}

pub(crate) async fn run(pool: &sqlx::PgPool, command: AccountsCommands) -> anyhow::Result<()> {
    match command {
        AccountsCommands::List { owner } => {
            let rows = mktsync_db::list_account_statuses(pool, owner.as_deref()).await?;
            if rows.is_empty() {
                println!("no accounts connected");
                return Ok(());
            }
            println!(
                "{:<38}{:<8}{:<14}{:<22}{:<12}{:<19}FAILURES",
                "ID", "PLATFORM", "SELLER", "NICKNAME", "CREDENTIAL", "EXPIRES"
            );
            let now = Utc::now();
            for row in &rows {
                println!("{}", format_row(row, now));
            }
        }
    }
    Ok(())
}

fn credential_state(row: &AccountStatusRow, now: DateTime<Utc>) -> &'static str {
    if !row.has_credential {
        "missing"
    } else if row.invalid_since.is_some() {
        "invalid"
    } else if row.expires_at.is_some_and(|at| at <= now) {
        "expired"
    } else {
        "ok"
    }
}

fn format_row(row: &AccountStatusRow, now: DateTime<Utc>) -> String {
    let nickname: String = row.nickname.as_deref().unwrap_or("\u{2014}").chars().take(20).collect();
    let expires = row.expires_at.map_or_else(
        || "\u{2014}".to_string(),
        |at| at.format("%Y-%m-%d %H:%M").to_string(),
    );
    format!(
        "{:<38}{:<8}{:<14}{:<22}{:<12}{:<19}{}",
        row.id,
        row.platform,
        row.external_seller_id,
        nickname,
        credential_state(row, now),
        expires,
        row.refresh_failure_count.unwrap_or(0)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn row() -> AccountStatusRow {
        AccountStatusRow {
            id: Uuid::nil(),
            owner_id: "owner-1".into(),
            platform: "meli".into(),
            external_seller_id: "123456".into(),
            nickname: Some("LOJA".into()),
            is_active: true,
            has_credential: true,
            expires_at: Some(Utc::now() + Duration::hours(1)),
            refresh_failure_count: Some(0),
            last_failure_reason: None,
            invalid_since: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn credential_state_priorities() {
        let now = Utc::now();
        assert_eq!(credential_state(&row(), now), "ok");

        let mut expired = row();
        expired.expires_at = Some(now - Duration::minutes(1));
        assert_eq!(credential_state(&expired, now), "expired");

        let mut flagged = expired.clone();
        flagged.invalid_since = Some(now);
        assert_eq!(credential_state(&flagged, now), "invalid");

        let mut missing = row();
        missing.has_credential = false;
        assert_eq!(credential_state(&missing, now), "missing");
    }

    #[test]
    fn row_shows_failures_and_placeholder_nickname() {
        let mut r = row();
        r.nickname = None;
        r.refresh_failure_count = Some(2);
        let line = format_row(&r, Utc::now());
        assert!(line.contains('\u{2014}'));
        assert!(line.ends_with('2'));
    }
}

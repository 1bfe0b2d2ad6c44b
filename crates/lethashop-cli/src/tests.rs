use super::*;
use chrono::TimeZone;

#[test]
fn parses_migrate_command() {
    let cli = Cli::try_parse_from(["lethashop-cli", "migrate"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Commands::Migrate));
}

#[test]
fn parses_seed_command() {
    let cli = Cli::try_parse_from(["lethashop-cli", "seed"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Commands::Seed));
}

#[test]
fn missing_command_is_an_error() {
    assert!(Cli::try_parse_from(["lethashop-cli"]).is_err());
}

#[test]
fn parses_create_admin_with_password() {
    let cli = Cli::try_parse_from([
        "lethashop-cli",
        "create-admin",
        "--email",
        "owner@example.com",
        "--password",
        "hunter22",
    ])
    .expect("expected valid cli args");

    match cli.command {
        Commands::CreateAdmin {
            email,
            password,
            name,
        } => {
            assert_eq!(email, "owner@example.com");
            assert_eq!(password.as_deref(), Some("hunter22"));
            assert!(name.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn create_admin_requires_email() {
    assert!(Cli::try_parse_from(["lethashop-cli", "create-admin"]).is_err());
}

#[test]
fn expire_payments_flags_default_off() {
    let cli =
        Cli::try_parse_from(["lethashop-cli", "expire-payments"]).expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Commands::ExpirePayments {
            query: false,
            dry_run: false
        }
    ));

    let cli = Cli::try_parse_from(["lethashop-cli", "expire-payments", "--query"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Commands::ExpirePayments { query: true, .. }
    ));
}

#[test]
fn query_result_codes_map_to_verdicts() {
    use payments::{verdict, QueryVerdict};
    assert_eq!(verdict(Some(0)), QueryVerdict::Completed);
    assert_eq!(verdict(Some(1032)), QueryVerdict::Failed(1032));
    assert_eq!(verdict(None), QueryVerdict::Unresolved);
}

#[test]
fn expiry_cutoff_subtracts_timeout() {
    let now = chrono::Utc
        .with_ymd_and_hms(2026, 3, 9, 12, 0, 0)
        .unwrap();
    assert_eq!(
        payments::expiry_cutoff(now, 300),
        chrono::Utc.with_ymd_and_hms(2026, 3, 9, 11, 55, 0).unwrap()
    );
    assert_eq!(
        payments::expiry_cutoff(now, u64::MAX),
        chrono::DateTime::<chrono::Utc>::MIN_UTC
    );
}

//! Command dispatch for the `arena` binary.
//!
//! `serve` runs the HTTP service. The other commands are self-contained
//! demos against a freshly seeded in-process store, useful for smoke-testing
//! the battle flow without standing up the real backend.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::battle::{self, Rng};
use crate::config::Settings;
use crate::data::{seed_database, SeedConfig, SeedReport};
use crate::error::Error;
use crate::server::{self, api::HistoryItem, AppContext};
use crate::store::{Database, Deadline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Serve,
    Battle,
    History,
    Wipe,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("serve") => Some(Command::Serve),
        Some("battle") => Some(Command::Battle),
        Some("history") => Some(Command::History),
        Some("wipe") => Some(Command::Wipe),
        _ => None,
    }
}

pub fn run_with_args(args: &[String]) -> i32 {
    match parse_command(args) {
        Some(Command::Serve) => handle_serve(),
        Some(Command::Battle) => handle_battle(args),
        Some(Command::History) => handle_history(args),
        Some(Command::Wipe) => handle_wipe(args),
        None => {
            eprintln!("usage: arena <serve|battle|history|wipe>");
            2
        }
    }
}

fn handle_serve() -> i32 {
    let settings = Settings::from_env();
    let db = Database::new(settings.store_config());
    if settings.seed_on_start {
        match seed_database(&db, &SeedConfig::default()) {
            Ok(report) => log::info!(
                "seeded {} characters and {} opponent templates",
                report.character_ids.len(),
                report.opponent_ids.len()
            ),
            Err(err) => {
                eprintln!("seeding failed: {err}");
                return 1;
            }
        }
    }
    let ctx = Arc::new(AppContext::new(db, settings));
    match server::run_server(ctx) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("server error: {err}");
            1
        }
    }
}

struct Demo {
    db: Database,
    settings: Settings,
    report: SeedReport,
    rng: Rng,
}

fn demo(seed: u64) -> Result<Demo, Error> {
    let settings = Settings::default();
    let db = Database::new(settings.store_config());
    let report = seed_database(
        &db,
        &SeedConfig {
            seed,
            ..SeedConfig::default()
        },
    )?;
    Ok(Demo {
        db,
        settings,
        report,
        rng: Rng::new(seed),
    })
}

/// Battles characters of the first seeded user; returns (wins, losses).
fn run_demo_battles(demo: &mut Demo, count: u32) -> Result<(u32, u32), Error> {
    let per_user = SeedConfig::default().characters_per_user;
    let own_characters = &demo.report.character_ids[..per_user];
    let deadline = Deadline::after(demo.settings.request_timeout);
    let mut wins = 0;
    let mut losses = 0;
    for _ in 0..count {
        let pick = demo.rng.gen_range(own_characters.len() as u64) as usize;
        let report = battle::execute_battle(
            &demo.db,
            &demo.settings.tuning,
            own_characters[pick],
            &deadline,
            &mut demo.rng,
        )?;
        if report.won {
            wins += 1;
        } else {
            losses += 1;
        }
    }
    Ok((wins, losses))
}

fn handle_battle(args: &[String]) -> i32 {
    let count = parse_u32_arg(args.get(2), "count", 10);
    let seed = parse_u64_arg(args.get(3), "seed", 7);

    let mut demo = match demo(seed) {
        Ok(demo) => demo,
        Err(err) => {
            eprintln!("seeding failed: {err}");
            return 1;
        }
    };
    match run_demo_battles(&mut demo, count) {
        Ok((wins, losses)) => {
            let payload = serde_json::json!({
                "battles": count,
                "wins": wins,
                "losses": losses,
                "history_rows": wins,
            });
            println!("{}", serde_json::to_string_pretty(&payload).expect("encode"));
            0
        }
        Err(err) => {
            eprintln!("battle failed: {err}");
            1
        }
    }
}

fn handle_history(args: &[String]) -> i32 {
    let count = parse_u32_arg(args.get(2), "count", 10);
    let seed = parse_u64_arg(args.get(3), "seed", 7);

    let mut demo = match demo(seed) {
        Ok(demo) => demo,
        Err(err) => {
            eprintln!("seeding failed: {err}");
            return 1;
        }
    };
    if let Err(err) = run_demo_battles(&mut demo, count) {
        eprintln!("battle failed: {err}");
        return 1;
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let deadline = Deadline::after(demo.settings.request_timeout);
    // The in-process demo store has no replica lag, so read without
    // staleness instead of waiting out the production delay.
    let records = match battle::list_history(
        &demo.db,
        Duration::ZERO,
        demo.report.user_ids[0],
        now - 3_600,
        now + 3_600,
        &deadline,
    ) {
        Ok(records) => records,
        Err(err) => {
            eprintln!("history read failed: {err}");
            return 1;
        }
    };
    let items: Vec<HistoryItem> = records.iter().map(HistoryItem::from_record).collect();
    match serde_json::to_string_pretty(&items) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize history: {err}");
            1
        }
    }
}

fn handle_wipe(args: &[String]) -> i32 {
    let count = parse_u32_arg(args.get(2), "count", 10);
    let seed = parse_u64_arg(args.get(3), "seed", 7);

    let mut demo = match demo(seed) {
        Ok(demo) => demo,
        Err(err) => {
            eprintln!("seeding failed: {err}");
            return 1;
        }
    };
    if let Err(err) = run_demo_battles(&mut demo, count) {
        eprintln!("battle failed: {err}");
        return 1;
    }
    let deadline = Deadline::after(demo.settings.request_timeout);
    match demo.db.partitioned_delete_history(&deadline, None) {
        Ok(deleted) => {
            println!("{}", serde_json::json!({ "deleted": deleted }));
            0
        }
        Err(err) => {
            eprintln!("wipe failed: {err}");
            1
        }
    }
}

fn parse_u32_arg(raw: Option<&String>, name: &str, default: u32) -> u32 {
    raw.and_then(|value| value.parse::<u32>().ok())
        .unwrap_or_else(|| {
            if let Some(value) = raw {
                eprintln!("invalid {name} '{value}', defaulting to {default}");
            }
            default
        })
}

fn parse_u64_arg(raw: Option<&String>, name: &str, default: u64) -> u64 {
    raw.and_then(|value| value.parse::<u64>().ok())
        .unwrap_or_else(|| {
            if let Some(value) = raw {
                eprintln!("invalid {name} '{value}', defaulting to {default}");
            }
            default
        })
}

//! CLI entry point.
//!
//! # Responsibility
//! - Verify `qbank_core` linkage with deterministic output.
//! - Inspect a store: list roles with bank sizes, or draw one paper printed
//!   by type and then difficulty.
//!
//! Usage:
//! - `qbank_cli` prints the health probe; with `QBANK_DB_PATH` set it also
//!   lists roles.
//! - `qbank_cli <db_path>` lists roles.
//! - `qbank_cli <db_path> <role_id> <target_score>` draws a paper with equal
//!   weights for every question type.

use log::info;
use qbank_core::{
    QuestionBankRepository, QuestionType, RatioMap, RoleRepository, StoreConfig, StoreContext,
};
use std::error::Error;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    println!("qbank_core ping={}", qbank_core::ping());
    println!("qbank_core version={}", qbank_core::core_version());

    if let Ok(log_dir) = std::env::var("QBANK_LOG_DIR") {
        let level = qbank_core::LogLevel::default_for_build();
        if let Err(err) = qbank_core::init_logging(level.as_str(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(std::env::args().skip(1).collect()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Vec<String>) -> Result<(), Box<dyn Error>> {
    let config = match args.first() {
        Some(path) => StoreConfig::new(path),
        None if std::env::var_os("QBANK_DB_PATH").is_some() => StoreConfig::from_env()?,
        None => return Ok(()),
    };
    let ctx = StoreContext::new(config);

    match args.as_slice() {
        [] | [_] => list_roles(&ctx).await,
        [_, role_id, target] => {
            let target: f64 = target
                .parse()
                .map_err(|_| format!("target score `{target}` is not a number"))?;
            print_paper(&ctx, role_id, target).await
        }
        _ => Err("usage: qbank_cli [<db_path> [<role_id> <target_score>]]".into()),
    }
}

async fn list_roles(ctx: &StoreContext) -> Result<(), Box<dyn Error>> {
    let roles = ctx.roles().list_all().await?;
    info!("event=cli_list module=cli status=ok roles={}", roles.len());

    println!("roles={}", roles.len());
    for role in roles {
        let bank = ctx.banks().get(&role.id).await?.unwrap_or_default();
        let types: Vec<&str> = bank.populated_types().map(QuestionType::label).collect();
        println!(
            "{}\t{}\tquestions={}\ttypes={}",
            role.id,
            role.name,
            bank.len(),
            types.join(",")
        );
    }
    Ok(())
}

async fn print_paper(ctx: &StoreContext, role_id: &str, target: f64) -> Result<(), Box<dyn Error>> {
    let ratios: RatioMap = QuestionType::ALL.iter().map(|kind| (*kind, 1.0)).collect();
    let bank = ctx.banks().get(role_id).await?;
    let paper = qbank_core::generate_paper(bank.as_ref(), &ratios, target);
    info!(
        "event=cli_paper module=cli status=ok questions={}",
        paper.list.len()
    );

    for (index, question) in paper.sorted_for_display().into_iter().enumerate() {
        println!(
            "{}. [{}] ({}) {}",
            index + 1,
            question.kind.label(),
            question.score,
            question.title
        );
        if let Some(options) = &question.options {
            for option in options {
                println!("   - {option}");
            }
        }
    }
    println!("total_score={}", paper.total_score);
    if let Some(shortfall) = paper.shortfall {
        println!("shortfall={shortfall}");
    }
    Ok(())
}

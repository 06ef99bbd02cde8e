use anyhow::Context;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use seg_eval::args::Args;
use seg_eval::common::EvalConfig;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = args
        .log_level
        .parse::<LevelFilter>()
        .with_context(|| format!("invalid --log_level `{}`", args.log_level))?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = EvalConfig::from_args(args)?;
    println!("{config}");

    let summary = seg_eval::run_evaluation(&config)?;
    println!("{summary}");

    println!("Evaluation Done!");
    Ok(())
}

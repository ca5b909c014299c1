use anyhow::Context;
use basket_core::ingest::provider::HttpJsonDataProvider;
use basket_core::llm::anthropic::AnthropicClient;
use basket_core::llm::error::LlmDiagnosticsError;
use basket_core::pipeline::{recommend, BudgetSource, RecommendationRequest, SelectionOptions};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ingest;
mod universe;

#[derive(Debug, Parser)]
#[command(name = "basket_worker")]
struct Args {
    /// Candidate batch JSON (array of instruments, or `{ "items": [...] }`).
    #[arg(long, required_unless_present = "fetch", conflicts_with = "fetch")]
    input: Option<PathBuf>,

    /// Price histories JSON: `{ "TICKER": [closing prices, oldest first] }`.
    #[arg(long, conflicts_with = "fetch")]
    histories: Option<PathBuf>,

    /// Pull candidates, exchange rate and histories from the market-data provider.
    #[arg(long)]
    fetch: bool,

    /// Market as-of date (YYYY-MM-DD). Defaults to today's KST date.
    #[arg(long)]
    as_of_date: Option<String>,

    #[arg(long, default_value_t = 50.0)]
    risk_tolerance: f64,

    /// Amount to invest, in KRW.
    #[arg(long, conflicts_with_all = ["salary", "expense"])]
    budget: Option<f64>,

    /// Monthly income; the investable share of salary minus expense becomes the budget.
    #[arg(long, requires = "expense")]
    salary: Option<f64>,

    #[arg(long, requires = "salary")]
    expense: Option<f64>,

    /// Defaults to PORTFOLIO_TARGET_COUNT.
    #[arg(long)]
    target_count: Option<usize>,

    /// Ask the language model for a narrative per selected instrument.
    #[arg(long)]
    analyze: bool,

    /// Write the report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = basket_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&settings, args).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "recommendation run failed");
        return Err(err);
    }

    Ok(())
}

async fn run(settings: &basket_core::config::Settings, args: Args) -> anyhow::Result<()> {
    let options = SelectionOptions::from_env();
    let as_of_date = resolve_as_of_date(args.as_of_date.as_deref())?;
    let budget = budget_source(&args)?;
    let (budget_amount, _) = budget.resolve(args.risk_tolerance)?;

    let (instruments, histories) = if args.fetch {
        let provider = HttpJsonDataProvider::from_settings(settings)?;
        let records = universe::fetch_universe(&provider, as_of_date).await?;
        let targets = universe::history_targets(
            &records,
            args.risk_tolerance,
            budget_amount,
            options.trend_lookahead,
        )?;
        let histories =
            ingest::fetch_histories(&provider, &targets, options.history_period_days).await;
        (records, histories)
    } else {
        let input = args
            .input
            .as_deref()
            .context("--input is required without --fetch")?;
        let records = universe::parse_batch(&universe::read_file(input)?)?;
        let histories = match args.histories.as_deref() {
            Some(path) => universe::parse_histories(&universe::read_file(path)?)?,
            None => BTreeMap::new(),
        };
        (records, histories)
    };

    tracing::info!(
        %as_of_date,
        candidates_len = instruments.len(),
        histories_len = histories.len(),
        "starting recommendation run"
    );

    let request = RecommendationRequest {
        instruments,
        risk_tolerance: args.risk_tolerance,
        budget,
        target_count: Some(args.target_count.unwrap_or(options.target_count)),
    };
    let mut recommendation = recommend(request, &histories)?;

    if recommendation.metadata.no_affordable_instruments {
        tracing::info!(
            %as_of_date,
            budget = recommendation.budget,
            "no affordable instruments; nothing to recommend"
        );
    } else if args.analyze {
        let llm = AnthropicClient::from_settings(settings)?;
        let failures =
            basket_core::llm::annotate_entries(&llm, &mut recommendation.entries).await;
        for err in &failures {
            if let Some(diag) = err.downcast_ref::<LlmDiagnosticsError>() {
                tracing::debug!(
                    ticker = %diag.ticker,
                    stage = %diag.stage,
                    raw_output = ?diag.raw_output_json(),
                    "LLM diagnostics"
                );
            }
            sentry_anyhow::capture_anyhow(err);
        }
    }

    if recommendation.metadata.trend_filter_fallback {
        tracing::warn!(%as_of_date, "every candidate failed the trend filter; trend-neutral selection used");
    }

    let report = serde_json::to_string_pretty(&recommendation)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, report)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), entries = recommendation.entries.len(), "report written");
        }
        None => println!("{report}"),
    }

    Ok(())
}

fn budget_source(args: &Args) -> anyhow::Result<BudgetSource> {
    match (args.budget, args.salary, args.expense) {
        (Some(budget), _, _) => Ok(BudgetSource::Amount { budget }),
        (None, Some(salary), Some(expense)) => Ok(BudgetSource::Income { salary, expense }),
        _ => anyhow::bail!("either --budget or both --salary and --expense are required"),
    }
}

fn init_sentry(settings: &basket_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn resolve_as_of_date(as_of_date_arg: Option<&str>) -> anyhow::Result<chrono::NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of-date {s}"));
    }

    let kst = chrono::FixedOffset::east_opt(9 * 3600).context("invalid KST offset")?;
    Ok(chrono::Utc::now().with_timezone(&kst).date_naive())
}

use clap::{Args, Parser, Subcommand, ValueEnum};
use per_diem_tracker::features::per_diem::{
    claim_days, show_month, validate_request, ClaimEdit, ClaimOutcome, MonthView,
    TrackerRequest, TrackerSnapshot,
};
use per_diem_tracker::features::reports::{available_actions, ReportStatus, Role};
use per_diem_tracker::shared::utils::{format_currency, DateKey};
use per_diem_tracker::{bootstrap, AppState};
use serde::Serialize;
use serde_json::json;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "per-diem")]
#[command(about = "Per-diem eligibility and monthly budget tracker")]
struct Cli {
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TargetArgs {
    #[arg(long)]
    employee: String,
    #[arg(long)]
    cost_center: String,
    #[arg(long)]
    month: u32,
    #[arg(long)]
    year: i32,
}

impl TargetArgs {
    fn request(&self) -> Result<TrackerRequest, String> {
        validate_request(&self.employee, &self.cost_center, self.month, self.year)
            .map_err(|e| e.user_message())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 日別の適格判定と請求状況を表示する
    Show {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
    /// 日当を請求・取り消しして保存する
    Claim {
        #[command(flatten)]
        target: TargetArgs,
        /// `YYYY-MM-DD` または `YYYY-MM-DD=金額`
        #[arg(long = "day")]
        days: Vec<ClaimEdit>,
        #[arg(long = "unclaim")]
        unclaims: Vec<DateKey>,
        #[arg(long, default_value_t = false)]
        all_eligible: bool,
    },
    /// 精算書のステータスとロールから操作ボタンを表示する
    ReportActions {
        #[arg(long)]
        status: String,
        #[arg(long, value_enum)]
        role: RoleCli,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleCli {
    Admin,
    Finance,
    Supervisor,
    SeniorStaff,
    Employee,
}

impl From<RoleCli> for Role {
    fn from(value: RoleCli) -> Self {
        match value {
            RoleCli::Admin => Role::Admin,
            RoleCli::Finance => Role::Finance,
            RoleCli::Supervisor => Role::Supervisor,
            RoleCli::SeniorStaff => Role::SeniorStaff,
            RoleCli::Employee => Role::Employee,
        }
    }
}

fn emit_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

fn print_snapshot(snapshot: &TrackerSnapshot) {
    println!(
        "Employee {}  Cost center {}  {}",
        snapshot.employee_id.as_deref().unwrap_or("-"),
        snapshot.cost_center.as_deref().unwrap_or("-"),
        snapshot.period.as_deref().unwrap_or("-"),
    );
    if let Some(limits) = snapshot.limits {
        println!(
            "Daily max {}  Monthly limit {}  Claimed {}  Remaining {}",
            format_currency(limits.daily_max),
            format_currency(limits.monthly_limit),
            format_currency(snapshot.total_claimed),
            format_currency(snapshot.remaining_budget),
        );
    }
    println!();
    println!(
        "{:<10}  {:<3}  {:<12}  {:<60}  {:<5}  {:>9}",
        "Date", "Day", "Status", "Reason", "Claim", "Amount"
    );

    for day in &snapshot.eligibility {
        let entry = snapshot.entries.iter().find(|e| e.date_key == day.date_key);
        let claimed = entry.map(|e| e.is_eligible).unwrap_or(false);
        let amount = entry.map(|e| format_currency(e.amount)).unwrap_or_default();
        println!(
            "{:<10}  {:<3}  {:<12}  {:<60}  {:<5}  {:>9}",
            day.date_key.to_string(),
            day.date_key.weekday_short(),
            day.label(),
            day.reason,
            if claimed { "[x]" } else { "[ ]" },
            amount,
        );
    }

    if let Some(notice) = &snapshot.notice {
        println!();
        println!("{notice}");
    }
}

fn print_month(view: &MonthView) {
    if !view.applied {
        println!("A newer load replaced this result.");
    }
    print_snapshot(&view.snapshot);
}

fn print_claim(outcome: &ClaimOutcome) {
    print_snapshot(&outcome.snapshot);
    println!();
    for (date_key, message) in &outcome.rejected {
        println!("{date_key}: {message}");
    }
    println!(
        "Saved: {} created, {} updated, {} deleted, {} unchanged",
        outcome.report.created, outcome.report.updated, outcome.report.deleted, outcome.report.unchanged
    );
}

async fn run(cli: Cli, state: &AppState) -> Result<(), String> {
    match cli.command {
        Commands::Show { target, refresh } => {
            let tracker = state.per_diem_tracker();
            let view = show_month(&tracker, target.request()?, refresh).await?;
            if cli.json {
                emit_json(&view)
            } else {
                print_month(&view);
                Ok(())
            }
        }
        Commands::Claim {
            target,
            days,
            unclaims,
            all_eligible,
        } => {
            let tracker = state.per_diem_tracker();
            let outcome =
                claim_days(&tracker, target.request()?, &days, &unclaims, all_eligible).await?;
            if cli.json {
                emit_json(&outcome)
            } else {
                print_claim(&outcome);
                Ok(())
            }
        }
        Commands::ReportActions { status, role } => {
            let status = ReportStatus::from_wire(&status)
                .ok_or_else(|| format!("Unknown report status: {status}"))?;
            let (label, tone) = status.badge();
            let actions = available_actions(status, role.into());
            if cli.json {
                emit_json(&json!({
                    "status": status,
                    "label": label,
                    "tone": tone,
                    "stage": status.stage_index(),
                    "terminal": status.is_terminal(),
                    "actions": actions,
                }))
            } else {
                println!("{label} ({tone:?}), stage {}", status.stage_index());
                for action in actions {
                    println!("  {action:?}");
                }
                Ok(())
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let state = match bootstrap() {
        Ok(state) => state,
        Err(e) => {
            eprintln!("{}", e.user_message());
            log::error!("初期化に失敗しました: {}", e.details());
            return ExitCode::FAILURE;
        }
    };

    match run(cli, &state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

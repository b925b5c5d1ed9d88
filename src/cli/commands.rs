use clap::{Parser, Subcommand};
use crate::config::Settings;
use crate::db::DbConnection;
use crate::engine::{AssignRequest, AssignmentEngine};
use crate::filter::parse_filter;
use crate::index::CrossStageIndex;
use crate::models::{Lot, StageGraph};
use crate::repo::{FlagRepo, HistoryRepo, LotRepo};
use crate::cli::error::{parse_attr, parse_flag_value, parse_quantity, validate_lot_id, validate_non_empty};
use crate::cli::output::{
    format_assign_outcome, format_conservation, format_history_table, format_lot_summary,
    format_lot_table, format_stage_summary, format_stage_table,
};
use std::collections::HashMap;
use anyhow::{Context, Result};

#[derive(Parser)]
#[command(name = "lotflow")]
#[command(about = "Lot Flow - track production lots through the manufacturing workflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register an order line as a new Planning lot
    Add {
        /// Sales order number
        sales_order: String,
        /// Line item within the sales order
        line_item: String,
        /// Ordered quantity
        #[arg(long)]
        qty: String,
        /// Customer
        #[arg(long, default_value = "")]
        party: String,
        /// Product code
        #[arg(long, default_value = "")]
        product: String,
        /// Entry date as written on the order sheet (defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Specification attribute (repeatable, e.g. --attr size=DN50)
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List lots resident in one stage
    List {
        /// Stage slug or label (e.g. semi-qc, "Assembly A")
        stage: String,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show detailed summary of a lot
    Show {
        /// Lot ID
        lot_id: String,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Forward quantity from a lot to the next stage, optionally splitting it
    Assign {
        /// Lot ID
        lot_id: String,
        /// Destination stage
        stage: String,
        /// Quantity to forward
        #[arg(allow_hyphen_values = true)]
        qty: String,
        /// Second destination stage for a split
        #[arg(long = "split-to", requires = "split_qty")]
        split_to: Option<String>,
        /// Quantity for the second destination
        #[arg(long = "split-qty", requires = "split_to", allow_hyphen_values = true)]
        split_qty: Option<String>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Record quantity leaving the factory from a lot at Dispatch
    Dispatch {
        /// Lot ID
        lot_id: String,
        /// Quantity dispatched
        #[arg(allow_hyphen_values = true)]
        qty: String,
    },
    /// Show the stage visits of a lot
    History {
        /// Lot ID
        lot_id: String,
        /// Show the whole order line's journey across every lot record
        #[arg(long)]
        lineage: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Mark or unmark an order line as urgent; without arguments, list urgent order lines
    Urgent {
        /// Order line code (e.g. SO-2291-4)
        #[arg(requires = "value")]
        code: Option<String>,
        /// 1/0, on/off or yes/no
        value: Option<String>,
    },
    /// Set the remark on an order line (empty text clears it)
    Remark {
        /// Order line code (e.g. SO-2291-4)
        code: String,
        /// Remark text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Search lots across every stage
    Search {
        /// Include lots already fully dispatched
        #[arg(long)]
        all: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Filter arguments (e.g. "stage=semi-qc urgent")
        filter: Vec<String>,
    },
    /// List workflow stages and where each may lead
    Stages {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show lot counts and quantities per stage
    Summary {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Check that an order line's quantity is fully accounted for
    Check {
        /// Order line code (e.g. SO-2291-4)
        code: String,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // Prints help/version (exit 0) or the usage error (exit 2)
        Err(e) => e.exit(),
    };

    handle_command(cli)
}

fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Add { sales_order, line_item, qty, party, product, date, attrs, json } => {
            handle_add(sales_order, line_item, qty, party, product, date, attrs, json)
        }
        Commands::List { stage, json } => handle_list(stage, json),
        Commands::Show { lot_id, json } => handle_show(lot_id, json),
        Commands::Assign { lot_id, stage, qty, split_to, split_qty, json } => {
            handle_assign(lot_id, stage, qty, split_to.zip(split_qty), json)
        }
        Commands::Dispatch { lot_id, qty } => handle_dispatch(lot_id, qty),
        Commands::History { lot_id, lineage, json } => handle_history(lot_id, lineage, json),
        Commands::Urgent { code, value } => match code.zip(value) {
            Some((code, value)) => handle_urgent(code, value),
            None => handle_urgent_list(),
        },
        Commands::Remark { code, text } => handle_remark(code, text),
        Commands::Search { all, json, filter } => handle_search(filter, all, json),
        Commands::Stages { json } => handle_stages(json),
        Commands::Summary { json } => handle_summary(json),
        Commands::Check { code, json } => handle_check(code, json),
    }
}

fn user_input<T>(result: std::result::Result<T, String>) -> Result<T> {
    result.map_err(|e| anyhow::anyhow!(e))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_add(
    sales_order: String,
    line_item: String,
    qty: String,
    party: String,
    product: String,
    date: Option<String>,
    attrs: Vec<String>,
    json: bool,
) -> Result<()> {
    user_input(validate_non_empty(&sales_order, "Sales order"))?;
    user_input(validate_non_empty(&line_item, "Line item"))?;
    let qty = user_input(parse_quantity(&qty))?;

    let mut lot = Lot::new_root(Lot::compose_unique_code(&sales_order, &line_item), qty);
    lot.party = party.trim().to_string();
    lot.product_code = product.trim().to_string();
    if let Some(date) = date {
        lot.entry_date = date.trim().to_string();
    }
    for attr in &attrs {
        let (key, value) = user_input(parse_attr(attr))?;
        lot.attrs.insert(key, value);
    }

    let conn = DbConnection::connect()
        .context("Failed to connect to database")?;
    let lot = LotRepo::create_root(&conn, &lot)?;

    if json {
        return print_json(&lot);
    }
    println!(
        "Created lot {} for {} with qty {} in {}.",
        lot.id.unwrap_or_default(),
        lot.unique_code,
        lot.qty,
        lot.stage
    );
    Ok(())
}

fn handle_list(stage: String, json: bool) -> Result<()> {
    let stage = StageGraph::parse(&stage)?;
    let conn = DbConnection::connect()
        .context("Failed to connect to database")?;
    let rows = CrossStageIndex::list_lots(&conn, stage)?;

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No lots in {}.", stage);
        return Ok(());
    }
    print!("{}", format_lot_table(&rows));
    Ok(())
}

fn handle_show(lot_id: String, json: bool) -> Result<()> {
    let lot_id = user_input(validate_lot_id(&lot_id))?;
    let conn = DbConnection::connect()
        .context("Failed to connect to database")?;

    let lot = LotRepo::get_by_id(&conn, lot_id)?
        .ok_or(crate::engine::EngineError::UnknownLot(lot_id))?;
    let flags = FlagRepo::get(&conn, &lot.unique_code)?;
    let history = HistoryRepo::timeline(&conn, lot_id)?;

    if json {
        return print_json(&serde_json::json!({
            "lot": &lot,
            "status": lot.status(),
            "qty_pending": lot.qty_pending(),
            "flags": &flags,
            "history": &history,
            "next_stages": StageGraph::successors(lot.stage),
        }));
    }
    print!("{}", format_lot_summary(&lot, &flags, &history));
    Ok(())
}

fn handle_assign(
    lot_id: String,
    stage: String,
    qty: String,
    split: Option<(String, String)>,
    json: bool,
) -> Result<()> {
    let lot_id = user_input(validate_lot_id(&lot_id))?;
    let stage = StageGraph::parse(&stage)?;
    let qty = user_input(parse_quantity(&qty))?;

    let request = match split {
        Some((split_stage, split_qty)) => {
            let split_stage = StageGraph::parse(&split_stage)?;
            let split_qty = user_input(parse_quantity(&split_qty))?;
            AssignRequest::split(lot_id, (stage, qty), (split_stage, split_qty))
        }
        None => AssignRequest::plain(lot_id, stage, qty),
    };

    let settings = Settings::load()?;
    let conn = DbConnection::connect_with(&settings)
        .context("Failed to connect to database")?;
    let outcome = AssignmentEngine::from_settings(&settings).assign(&conn, &request)?;

    if json {
        return print_json(&outcome);
    }
    print!("{}", format_assign_outcome(&outcome));
    Ok(())
}

fn handle_dispatch(lot_id: String, qty: String) -> Result<()> {
    let lot_id = user_input(validate_lot_id(&lot_id))?;
    let qty = user_input(parse_quantity(&qty))?;

    let settings = Settings::load()?;
    let conn = DbConnection::connect_with(&settings)
        .context("Failed to connect to database")?;
    let lot = AssignmentEngine::from_settings(&settings).dispatch(&conn, lot_id, qty)?;

    println!(
        "Dispatched {} of lot {} ({}); {} still pending.",
        qty,
        lot_id,
        lot.unique_code,
        lot.qty_pending()
    );
    Ok(())
}

fn handle_history(lot_id: String, lineage: bool, json: bool) -> Result<()> {
    let lot_id = user_input(validate_lot_id(&lot_id))?;
    let conn = DbConnection::connect()
        .context("Failed to connect to database")?;

    let lot = LotRepo::get_by_id(&conn, lot_id)?
        .ok_or(crate::engine::EngineError::UnknownLot(lot_id))?;
    let entries = if lineage {
        HistoryRepo::lineage(&conn, &lot.unique_code)?
    } else {
        HistoryRepo::timeline(&conn, lot_id)?
    };

    if json {
        return print_json(&entries);
    }
    let codes: HashMap<i64, String> = LotRepo::list_by_code(&conn, &lot.unique_code)?
        .into_iter()
        .filter_map(|l| l.id.map(|id| (id, l.unique_code)))
        .collect();
    print!("{}", format_history_table(&entries, &codes));
    Ok(())
}

fn handle_urgent(code: String, value: String) -> Result<()> {
    let urgent = user_input(parse_flag_value(&value))?;
    let conn = DbConnection::connect()
        .context("Failed to connect to database")?;
    let flags = FlagRepo::set_urgent(&conn, &code, urgent)?;

    if flags.urgent {
        println!("Marked {} urgent.", flags.unique_code);
    } else {
        println!("Cleared urgent flag on {}.", flags.unique_code);
    }
    Ok(())
}

fn handle_urgent_list() -> Result<()> {
    let conn = DbConnection::connect()
        .context("Failed to connect to database")?;
    let urgent = FlagRepo::list_urgent(&conn)?;

    if urgent.is_empty() {
        println!("No urgent order lines.");
        return Ok(());
    }
    for flags in urgent {
        if flags.has_remark() {
            println!("{}  {}", flags.unique_code, flags.remark);
        } else {
            println!("{}", flags.unique_code);
        }
    }
    Ok(())
}

fn handle_remark(code: String, text: Vec<String>) -> Result<()> {
    let conn = DbConnection::connect()
        .context("Failed to connect to database")?;
    let flags = FlagRepo::set_remark(&conn, &code, &text.join(" "))?;

    if flags.has_remark() {
        println!("Remark on {}: {}", flags.unique_code, flags.remark);
    } else {
        println!("Cleared remark on {}.", flags.unique_code);
    }
    Ok(())
}

fn handle_search(filter_args: Vec<String>, all: bool, json: bool) -> Result<()> {
    let filter = parse_filter(filter_args)
        .map_err(|e| anyhow::anyhow!("Filter parse error: {}", e))?;
    let conn = DbConnection::connect()
        .context("Failed to connect to database")?;
    let rows = CrossStageIndex::search(&conn, &filter, all)
        .context("Failed to search lots")?;

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No lots found.");
        return Ok(());
    }
    print!("{}", format_lot_table(&rows));
    Ok(())
}

fn handle_stages(json: bool) -> Result<()> {
    if json {
        let stages: Vec<serde_json::Value> = StageGraph::ordered()
            .iter()
            .map(|&stage| {
                serde_json::json!({
                    "stage": stage,
                    "label": stage.label(),
                    "successors": StageGraph::successors(stage),
                    "terminal": StageGraph::is_terminal(stage),
                })
            })
            .collect();
        return print_json(&stages);
    }
    print!("{}", format_stage_table());
    Ok(())
}

fn handle_summary(json: bool) -> Result<()> {
    let conn = DbConnection::connect()
        .context("Failed to connect to database")?;
    let summary = CrossStageIndex::stage_summary(&conn)?;

    if json {
        return print_json(&summary);
    }
    print!("{}", format_stage_summary(&summary));
    Ok(())
}

fn handle_check(code: String, json: bool) -> Result<()> {
    let conn = DbConnection::connect()
        .context("Failed to connect to database")?;
    let report = CrossStageIndex::conservation(&conn, &code)?;

    if json {
        let holds = report.holds();
        return print_json(&serde_json::json!({
            "report": &report,
            "holds": holds,
        }));
    }
    print!("{}", format_conservation(&report));
    if !report.holds() {
        anyhow::bail!("Order line {} does not balance", report.unique_code);
    }
    Ok(())
}

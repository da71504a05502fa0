use std::{
    io::{self, BufRead, Write},
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use client_core::{
    ActionKind, ActionSet, ConfirmPrompt, Notifier, RowView, Trigger, SCORE_CELL, SUGGESTION_CELL,
    VALIDITY_CELL,
};
use reqwest::{header, Client};
use shared::domain::Subscription;

const CELLS_PER_ROW: usize = 5;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: String,
    #[arg(long, default_value = "admin")]
    username: String,
    #[arg(long, default_value = "listkeeper!")]
    password: String,
}

struct RowState {
    email: String,
    cells: [String; CELLS_PER_ROW],
    attached: bool,
}

impl RowState {
    fn from_subscription(subscription: &Subscription) -> Self {
        let mut cells: [String; CELLS_PER_ROW] = Default::default();
        cells[0] = subscription.email.clone();
        cells[1] = subscription.name.clone();
        if let Some(report) = &subscription.verification {
            if let Some(valid) = report.format_valid {
                cells[VALIDITY_CELL] = valid.to_string();
            }
            if let Some(score) = report.score {
                cells[SCORE_CELL] = score.to_string();
            }
            if let Some(suggestion) = &report.did_you_mean {
                cells[SUGGESTION_CELL] = suggestion.clone();
            }
        }
        Self {
            email: subscription.email.clone(),
            cells,
            attached: true,
        }
    }
}

struct TableState {
    rows: Vec<RowState>,
}

/// One printed table row, addressable by the action layer.
struct ConsoleRow {
    table: Arc<Mutex<TableState>>,
    index: usize,
}

impl RowView for ConsoleRow {
    fn set_field(&self, index: usize, value: &str) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cell) = table
            .rows
            .get_mut(self.index)
            .and_then(|row| row.cells.get_mut(index))
        {
            *cell = value.to_string();
        }
    }

    fn remove(&self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(row) = table.rows.get_mut(self.index) {
            row.attached = false;
        }
    }

    fn is_attached(&self) -> bool {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table
            .rows
            .get(self.index)
            .map(|row| row.attached)
            .unwrap_or(false)
    }
}

struct StdinConfirm;

impl ConfirmPrompt for StdinConfirm {
    fn confirm(&self, message: &str) -> bool {
        print!("{message} [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}

struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn alert(&self, message: &str) {
        println!("{message}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();
    let args = Args::parse();
    let server_url = args.server_url.trim_end_matches('/').to_string();

    let http = authorized_client(&args.username, &args.password)?;
    let actions = ActionSet::with_client(
        http.clone(),
        Arc::new(StdinConfirm),
        Arc::new(StdoutNotifier),
    );

    let table = Arc::new(Mutex::new(TableState { rows: Vec::new() }));
    refresh(&http, &server_url, &table).await?;
    print_table(&table);
    println!("commands: list | delete <n> | validate <n> | quit");

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("quit"), _) | (Some("q"), _) => break,
            (Some("list"), _) => {
                refresh(&http, &server_url, &table).await?;
                print_table(&table);
            }
            (Some(command @ ("delete" | "validate")), Some(position)) => {
                let Ok(position) = position.parse::<usize>() else {
                    println!("not a row number: {position}");
                    continue;
                };
                let Some(index) = nth_attached(&table, position) else {
                    println!("no such row: {position}");
                    continue;
                };
                run_action(command, &actions, &server_url, &table, index).await;
                print_table(&table);
            }
            (Some("delete" | "validate"), None) => println!("usage: delete <n> | validate <n>"),
            (Some(other), _) => println!("unknown command: {other}"),
            (None, _) => {}
        }
    }

    Ok(())
}

fn authorized_client(username: &str, password: &str) -> Result<Client> {
    let credentials = STANDARD.encode(format!("{username}:{password}"));
    let mut headers = header::HeaderMap::new();
    let mut value = header::HeaderValue::from_str(&format!("Basic {credentials}"))
        .context("credentials are not valid header text")?;
    value.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, value);
    Client::builder()
        .default_headers(headers)
        .build()
        .context("failed to build http client")
}

async fn refresh(http: &Client, server_url: &str, table: &Arc<Mutex<TableState>>) -> Result<()> {
    let subscriptions: Vec<Subscription> = http
        .get(format!("{server_url}/subscriptions"))
        .send()
        .await?
        .error_for_status()
        .context("failed to list subscriptions; check credentials and server url")?
        .json()
        .await?;

    let rows = subscriptions.iter().map(RowState::from_subscription).collect();
    table.lock().unwrap_or_else(PoisonError::into_inner).rows = rows;
    Ok(())
}

async fn run_action(
    command: &str,
    actions: &ActionSet,
    server_url: &str,
    table: &Arc<Mutex<TableState>>,
    index: usize,
) {
    let email = {
        let guard = table.lock().unwrap_or_else(PoisonError::into_inner);
        guard.rows[index].email.clone()
    };

    let (kind, trigger) = match command {
        "delete" => (
            ActionKind::Delete,
            Trigger::new(format!("{server_url}/subscriptions/{email}"), "delete"),
        ),
        _ => (
            ActionKind::Validate,
            Trigger::new(
                format!("{server_url}/subscriptions/{email}/validate"),
                "validate",
            ),
        ),
    };

    let row = ConsoleRow {
        table: Arc::clone(table),
        index,
    };
    actions.click(kind, &trigger, &row).await;
}

/// Maps a 1-based display position onto the backing row index, skipping rows
/// that have been removed.
fn nth_attached(table: &Arc<Mutex<TableState>>, position: usize) -> Option<usize> {
    if position == 0 {
        return None;
    }
    let guard = table.lock().unwrap_or_else(PoisonError::into_inner);
    guard
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.attached)
        .nth(position - 1)
        .map(|(index, _)| index)
}

fn print_table(table: &Arc<Mutex<TableState>>) {
    let guard = table.lock().unwrap_or_else(PoisonError::into_inner);
    println!(
        "{:<4} {:<30} {:<20} {:<8} {:<8} {}",
        "#", "email", "name", "valid", "score", "suggestion"
    );
    for (position, row) in guard.rows.iter().filter(|row| row.attached).enumerate() {
        println!(
            "{:<4} {:<30} {:<20} {:<8} {:<8} {}",
            position + 1,
            row.cells[0],
            row.cells[1],
            row.cells[VALIDITY_CELL],
            row.cells[SCORE_CELL],
            row.cells[SUGGESTION_CELL],
        );
    }
}

//! Interactive console.
//!
//! Each input line is one statement. Lines starting with `:` are console
//! commands: `:use <namespace>`, `:hosts`, `:clients`, `:json`, `:quit`.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::Session;
use crate::output;

#[derive(Args)]
pub struct ConsoleArgs {
    /// Namespace to start in
    #[arg(short, long, default_value = "")]
    pub namespace: String,
}

enum Directive {
    Use(String),
    Hosts,
    Clients,
    ToggleJson,
    Quit,
    Unknown(String),
}

fn parse_directive(line: &str) -> Option<Directive> {
    let rest = line.strip_prefix(':')?;
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map(|(n, a)| (n, a.trim()))
        .unwrap_or((rest, ""));
    Some(match name {
        "use" => Directive::Use(arg.to_string()),
        "hosts" => Directive::Hosts,
        "clients" => Directive::Clients,
        "json" => Directive::ToggleJson,
        "quit" | "exit" | "q" => Directive::Quit,
        other => Directive::Unknown(other.to_string()),
    })
}

pub async fn execute(session: &Session<'_>, args: ConsoleArgs) -> Result<()> {
    let mut namespace = args.namespace;
    let mut json = false;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("{}", "Connected. Type :quit to leave.".dimmed());
    loop {
        let prompt = if namespace.is_empty() {
            "studio> ".to_string()
        } else {
            format!("studio({namespace})> ")
        };
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(directive) = parse_directive(line) {
            match directive {
                Directive::Use(ns) => namespace = ns,
                Directive::Hosts => match session.gateway.cluster_hosts(session.client_id).await {
                    Ok(hosts) => hosts.iter().for_each(|h| println!("  {h}")),
                    Err(err) => output::print_error(&err),
                },
                Directive::Clients => output::print_clients(&session.gateway.clients()),
                Directive::ToggleJson => {
                    json = !json;
                    println!("JSON output {}", if json { "on" } else { "off" });
                }
                Directive::Quit => break,
                Directive::Unknown(name) => {
                    println!("{} unknown command :{name}", "!".yellow())
                }
            }
            continue;
        }

        match session
            .gateway
            .execute(session.client_id, &namespace, vec![line.to_string()])
            .await
        {
            Ok(results) => {
                for result in &results {
                    if json {
                        println!("{}", serde_json::to_string_pretty(result)?);
                    } else {
                        output::print_statement_result(result);
                    }
                }
            }
            Err(err) => {
                output::print_error(&err);
                if err.requires_relogin() {
                    anyhow::bail!("client is no longer connected");
                }
            }
        }
    }
    Ok(())
}

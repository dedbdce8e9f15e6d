//! Batch statement execution.

use anyhow::Result;
use clap::Args;

use super::Session;
use crate::output;

#[derive(Args)]
pub struct QueryArgs {
    /// Statements, executed in order on one session
    #[arg(required = true)]
    pub statements: Vec<String>,

    /// Namespace to switch to before the first statement
    #[arg(short, long, default_value = "")]
    pub namespace: String,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(session: &Session<'_>, args: QueryArgs) -> Result<()> {
    let results = session
        .gateway
        .execute(session.client_id, &args.namespace, args.statements)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    let failed = results.iter().filter(|r| !r.is_ok()).count();
    for result in &results {
        output::print_statement_result(result);
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} statement(s) failed", results.len());
    }
    Ok(())
}

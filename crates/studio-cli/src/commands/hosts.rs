//! Cluster host listing.

use anyhow::Result;
use colored::Colorize;

use super::Session;

pub async fn execute(session: &Session<'_>) -> Result<()> {
    let hosts = session.gateway.cluster_hosts(session.client_id).await?;
    if hosts.is_empty() {
        println!("{}", "No hosts reported.".dimmed());
        return Ok(());
    }

    println!("{}", "Cluster Hosts".bold());
    for host in &hosts {
        println!("  {} {}", "●".cyan(), host);
    }
    Ok(())
}

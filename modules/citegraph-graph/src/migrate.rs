use neo4rs::query;
use tracing::{info, warn};

use citegraph_common::NodeLabel;

use crate::GraphClient;

/// Run idempotent schema migrations: natural-key uniqueness constraints
/// (which also back the MERGE lookups with an index) plus the indexes the
/// reconciler and pruner filter on.
pub async fn migrate(client: &GraphClient) -> Result<(), neo4rs::Error> {
    let g = &client.graph;

    info!("Running schema migrations...");

    for stmt in constraint_statements() {
        run_ignoring_exists(g, &stmt).await?;
    }
    info!("Natural-key uniqueness constraints created");

    let indexes = [
        "CREATE INDEX paper_state IF NOT EXISTS FOR (p:paper) ON (p.state)",
        "CREATE INDEX paper_cited_by_count IF NOT EXISTS FOR (p:paper) ON (p.cited_by_count)",
    ];
    for idx in &indexes {
        run_ignoring_exists(g, idx).await?;
    }
    info!("Property indexes created");

    info!("Schema migration complete");
    Ok(())
}

pub(crate) fn constraint_statements() -> Vec<String> {
    NodeLabel::ALL
        .iter()
        .map(|label| {
            format!(
                "CREATE CONSTRAINT {name}_{key}_unique IF NOT EXISTS FOR (n:{name}) REQUIRE n.{key} IS UNIQUE",
                name = label.as_str(),
                key = label.key_property(),
            )
        })
        .collect()
}

/// Run a Cypher statement, ignoring errors that indicate the constraint/index already exists.
async fn run_ignoring_exists(g: &neo4rs::Graph, cypher: &str) -> Result<(), neo4rs::Error> {
    match g.run(query(cypher)).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let msg = e.to_string().to_lowercase();
            if msg.contains("already exists") || msg.contains("equivalent") {
                warn!("Already exists (skipped): {}", cypher.chars().take(80).collect::<String>());
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

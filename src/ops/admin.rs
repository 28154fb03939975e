use std::sync::atomic::Ordering;

use tracing::{info, instrument};

use super::{AdminAction, AdminRequest, AdminResponse, Observed, Operation, OpsResult, VectorOps};
use crate::sql::{
    IndexKind, SimilarityMetric, Statement,
    builder::{
        create_extension, create_index, create_table, default_index_name, drop_index, set_probes,
    },
};

impl VectorOps {
    /// Schema management: extension, table and index DDL, and the default
    /// `ivfflat.probes` for later searches.
    #[instrument(skip_all, fields(backend = "pgvector", operation = "admin", action = request.action.as_str()))]
    pub async fn admin(&self, request: AdminRequest) -> OpsResult<AdminResponse> {
        self.observe(Operation::Admin, self.run_admin(request))
            .await
    }

    async fn run_admin(&self, request: AdminRequest) -> OpsResult<Observed<AdminResponse>> {
        let action = request.action;
        let settings = Self::timeout_settings(request.timeout_ms);
        let metric = match request.metric.as_deref() {
            Some(name) => SimilarityMetric::from_name(Some(name)),
            None => self.defaults.metric,
        };

        let (statement, index_name): (Statement, Option<String>) = match action {
            AdminAction::CreateExtension => (create_extension(), None),
            AdminAction::CreateTable => {
                let table = self.resolve_name(request.table, self.defaults.table.as_ref(), "table")?;
                let column =
                    self.resolve_name(request.column, self.defaults.column.as_ref(), "column")?;
                let id_column = request
                    .id_column
                    .unwrap_or_else(|| self.defaults.id_column.clone());
                let dimension = request.dimension.or(self.defaults.dimension);
                (create_table(&table, &column, &id_column, dimension)?, None)
            }
            AdminAction::CreateIvfflat | AdminAction::CreateHnsw => {
                let table = self.resolve_name(request.table, self.defaults.table.as_ref(), "table")?;
                let column =
                    self.resolve_name(request.column, self.defaults.column.as_ref(), "column")?;
                let kind = if action == AdminAction::CreateIvfflat {
                    IndexKind::IvfFlat {
                        lists: request.lists.unwrap_or(IndexKind::DEFAULT_LISTS),
                    }
                } else {
                    IndexKind::Hnsw {
                        m: request.m.unwrap_or(IndexKind::DEFAULT_M),
                        ef_construction: request
                            .ef_construction
                            .unwrap_or(IndexKind::DEFAULT_EF_CONSTRUCTION),
                    }
                };
                let name = request
                    .index_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| default_index_name(&table, &column, kind));
                (
                    create_index(&table, &column, metric, kind, Some(&name))?,
                    Some(name),
                )
            }
            AdminAction::DropIndex => (
                drop_index(request.index_name.as_deref())?,
                request.index_name,
            ),
            AdminAction::SetProbes => (set_probes(request.probes)?, None),
        };

        let pool = self.pool(&request.connection)?;
        let output = if action == AdminAction::SetProbes {
            // Checked inside a transaction so the pooled session keeps its value.
            let mut outputs = pool
                .execute_batch_with_retry(
                    std::slice::from_ref(&statement),
                    &settings,
                    Operation::Admin.as_str(),
                )
                .await?;
            outputs.pop().unwrap_or_default()
        } else {
            pool.execute_with_retry(&statement, &settings, Operation::Admin.as_str())
                .await?
        };

        if let (AdminAction::SetProbes, Some(probes)) = (action, request.probes) {
            self.probes.store(probes, Ordering::Relaxed);
            info!(
                stage = "probes_updated",
                probes = probes,
                "Default ivfflat.probes updated for searches"
            );
        }

        Ok(Observed {
            item_count: output.row_count as usize,
            attempts: output.attempts,
            value: AdminResponse {
                ok: true,
                action,
                row_count: output.row_count,
                index_name,
            },
        })
    }
}

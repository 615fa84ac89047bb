// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::aggregator::ValueAggregator;
use crate::aggregator_handler::AggregatorHandler;
use crate::algorithm::Algorithm;
use crate::error::ConductorError;
use crate::master_context::{MasterContext, MasterEnv};
use crate::message_stats::MessageStats;
use crate::recovery::{Recovery, RecoveryPhase};
use crate::stats_manager::StatsManager;
use crate::types::{Superstep, WorkerId};
use crate::worker_channel::{CompensationRound, PrepareSuperstep, WorkerChannel};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ConductorConfig {
    /// Hard cap on supersteps, in case the algorithm never converges
    pub max_supersteps: u64,
    /// Drain attempts before giving up on in-flight messages
    pub drain_retries: u32,
    pub drain_backoff: Duration,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            max_supersteps: 500,
            drain_retries: 10,
            drain_backoff: Duration::from_millis(5),
        }
    }
}

/// What one completed execution looked like
#[derive(Debug)]
pub struct ExecutionReport {
    pub algorithm: String,
    pub supersteps: Superstep,
    /// True if the master context halted the run, false if it reached
    /// quiescence (or the superstep cap)
    pub halted_by_master: bool,
    pub recoveries: u32,
    pub worker_stats: HashMap<WorkerId, MessageStats>,
}

enum SuperstepVerdict {
    Continue,
    Halt { by_master: bool },
}

/// The master: drives supersteps across all workers through the
/// channel, folds their aggregator contributions, polls the quiescence
/// oracle, and runs the compensation protocol when a partition is lost
pub struct Conductor<C: WorkerChannel> {
    channel: C,
    algorithm_name: String,
    master_context: Box<dyn MasterContext>,
    aggregators: AggregatorHandler,
    stats: StatsManager,
    recovery: Recovery,
    config: ConductorConfig,
    has_compensation: bool,
    superstep: Superstep,
    vertex_count: u64,
    edge_count: u64,
    lifetime_stats: HashMap<WorkerId, MessageStats>,
    recoveries: u32,
}

impl<C: WorkerChannel> Conductor<C> {
    pub fn new(
        channel: C,
        algorithm_name: String,
        master_context: Box<dyn MasterContext>,
        registrations: Vec<(String, ValueAggregator)>,
        has_compensation: bool,
        config: ConductorConfig,
    ) -> Self {
        Self {
            channel,
            algorithm_name,
            master_context,
            aggregators: AggregatorHandler::new(registrations),
            stats: StatsManager::new(),
            recovery: Recovery::new(),
            config,
            has_compensation,
            superstep: 0,
            vertex_count: 0,
            edge_count: 0,
            lifetime_stats: HashMap::new(),
            recoveries: 0,
        }
    }

    /// Wire a conductor to an algorithm's registrations
    pub fn for_algorithm<V, E, M>(
        channel: C,
        algorithm: &dyn Algorithm<V, E, M>,
        config: ConductorConfig,
    ) -> Self
    where
        M: Clone + Send + 'static,
    {
        let has_compensation = algorithm.vertex_compensation().is_some();
        Self::new(
            channel,
            algorithm.name().to_string(),
            algorithm.master_context(),
            algorithm.aggregators(),
            has_compensation,
            config,
        )
    }

    pub fn superstep(&self) -> Superstep {
        self.superstep
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    pub fn aggregators(&self) -> &AggregatorHandler {
        &self.aggregators
    }

    /// Drive the execution to completion
    pub async fn run(&mut self) -> Result<ExecutionReport, ConductorError> {
        let (vertex_count, edge_count) = self.channel.graph_totals().await?;
        self.vertex_count = vertex_count;
        self.edge_count = edge_count;
        info!(
            algorithm = %self.algorithm_name,
            vertices = vertex_count,
            edges = edge_count,
            "execution starting"
        );

        let worker_count = self.channel.alive_workers().await.len() as u64;
        {
            let Self {
                master_context,
                aggregators,
                ..
            } = self;
            let mut env = MasterEnv {
                superstep: 0,
                vertex_count,
                edge_count,
                worker_count,
                recovery_step: 0,
                aggregators,
            };
            master_context.pre_application(&mut env);
        }
        self.channel.pre_application().await?;

        let mut halted_by_master = false;
        loop {
            if self.superstep >= self.config.max_supersteps {
                warn!(
                    superstep = self.superstep,
                    "superstep cap reached before convergence"
                );
                break;
            }
            match self.run_one_superstep().await {
                Ok(SuperstepVerdict::Continue) => {}
                Ok(SuperstepVerdict::Halt { by_master }) => {
                    halted_by_master = by_master;
                    break;
                }
                Err(ConductorError::WorkerUnreachable(lost)) => {
                    self.recover(lost).await?;
                }
                Err(e) => return Err(e),
            }
        }

        let worker_count = self.channel.alive_workers().await.len() as u64;
        {
            let Self {
                master_context,
                aggregators,
                superstep,
                vertex_count,
                edge_count,
                ..
            } = self;
            let mut env = MasterEnv {
                superstep: *superstep,
                vertex_count: *vertex_count,
                edge_count: *edge_count,
                worker_count,
                recovery_step: 0,
                aggregators,
            };
            master_context.post_application(&mut env);
        }
        self.channel.finalize().await?;

        info!(
            algorithm = %self.algorithm_name,
            supersteps = self.superstep,
            halted_by_master,
            "execution finished"
        );
        Ok(ExecutionReport {
            algorithm: self.algorithm_name.clone(),
            supersteps: self.superstep,
            halted_by_master,
            recoveries: self.recoveries,
            worker_stats: self.lifetime_stats.clone(),
        })
    }

    async fn run_one_superstep(&mut self) -> Result<SuperstepVerdict, ConductorError> {
        let worker_count = self.channel.alive_workers().await.len() as u64;
        {
            let Self {
                master_context,
                aggregators,
                superstep,
                vertex_count,
                edge_count,
                ..
            } = self;
            let mut env = MasterEnv {
                superstep: *superstep,
                vertex_count: *vertex_count,
                edge_count: *edge_count,
                worker_count,
                recovery_step: 0,
                aggregators,
            };
            master_context.pre_global_superstep(&mut env);
        }

        // broadcast last superstep's global values, then start folding
        // this superstep's contributions from a clean slate
        let snapshot = self.aggregators.serialize_values();
        self.channel
            .prepare_superstep(PrepareSuperstep {
                superstep: self.superstep,
                aggregator_snapshot: snapshot,
            })
            .await?;
        self.aggregators.reset_values();
        self.stats.reset();
        self.stats.reset_active_count();

        let outcomes = self.channel.run_superstep().await?;
        for (worker, outcome) in &outcomes {
            self.stats.accumulate_message_stats(*worker, &outcome.stats);
            self.stats
                .accumulate_active_counts(*worker, outcome.active_count);
            self.aggregators.absorb_values(&outcome.aggregator_values);
            self.lifetime_stats
                .entry(*worker)
                .or_default()
                .accumulate(&outcome.stats);
        }

        self.drain_in_flight().await?;

        let worker_count = self.channel.alive_workers().await.len() as u64;
        let continue_run = {
            let Self {
                master_context,
                aggregators,
                superstep,
                vertex_count,
                edge_count,
                ..
            } = self;
            let mut env = MasterEnv {
                superstep: *superstep,
                vertex_count: *vertex_count,
                edge_count: *edge_count,
                worker_count,
                recovery_step: 0,
                aggregators,
            };
            master_context.post_global_superstep(&mut env)
        };

        self.superstep += 1;
        debug!(
            superstep = self.superstep,
            sent = self.stats.total_send_count(),
            active = !self.stats.no_active_vertices(),
            "superstep complete"
        );

        if !continue_run {
            return Ok(SuperstepVerdict::Halt { by_master: true });
        }
        // quiescence: nobody voted to stay active and nothing was sent
        // this superstep, so no message can arrive in the next one
        if self.stats.no_active_vertices() && self.stats.total_send_count() == 0 {
            return Ok(SuperstepVerdict::Halt { by_master: false });
        }
        Ok(SuperstepVerdict::Continue)
    }

    /// Poll workers until every sent message has been received
    async fn drain_in_flight(&mut self) -> Result<(), ConductorError> {
        let mut retries = self.config.drain_retries;
        while !self.stats.all_messages_processed() {
            if retries == 0 {
                return Err(ConductorError::DrainTimeout {
                    sent: self.stats.total_send_count(),
                    received: self.stats.total_received_count(),
                });
            }
            retries -= 1;
            debug!(
                sent = self.stats.total_send_count(),
                received = self.stats.total_received_count(),
                "messages still in flight"
            );
            tokio::time::sleep(self.config.drain_backoff).await;
            for (worker, delta) in self.channel.collect_stats().await? {
                self.stats.accumulate_message_stats(worker, &delta);
                self.lifetime_stats
                    .entry(worker)
                    .or_default()
                    .accumulate(&delta);
            }
        }
        Ok(())
    }

    /// The two-phase compensation protocol, run instead of a normal
    /// superstep when a partition is lost
    async fn recover(&mut self, lost: WorkerId) -> Result<(), ConductorError> {
        if !self.has_compensation {
            return Err(ConductorError::NoCompensation);
        }
        warn!(lost_worker = lost, "partition lost, entering compensation");
        self.recoveries += 1;

        let lost_shards = self.channel.repair().await?;
        let (vertex_count, edge_count) = self.channel.graph_totals().await?;
        self.vertex_count = vertex_count;
        self.edge_count = edge_count;
        self.recovery.begin(lost_shards);

        loop {
            let recovery_step = self.recovery.recovery_step();
            let worker_count = self.channel.alive_workers().await.len() as u64;

            let proceed = {
                let Self {
                    master_context,
                    aggregators,
                    superstep,
                    vertex_count,
                    edge_count,
                    ..
                } = self;
                let mut env = MasterEnv {
                    superstep: *superstep,
                    vertex_count: *vertex_count,
                    edge_count: *edge_count,
                    worker_count,
                    recovery_step,
                    aggregators,
                };
                master_context.pre_compensation(&mut env)
            };

            if proceed {
                let snapshot = self.aggregators.serialize_values();
                self.aggregators.reset_values();
                let outcomes = self
                    .channel
                    .run_compensation(CompensationRound {
                        recovery_step,
                        lost_shards: self.recovery.lost_shards().to_vec(),
                        aggregator_snapshot: snapshot,
                    })
                    .await?;
                for (worker, outcome) in &outcomes {
                    self.stats
                        .accumulate_active_counts(*worker, outcome.active_count);
                    self.aggregators.absorb_values(&outcome.aggregator_values);
                }
            }

            let more_rounds = {
                let Self {
                    master_context,
                    aggregators,
                    superstep,
                    vertex_count,
                    edge_count,
                    ..
                } = self;
                let mut env = MasterEnv {
                    superstep: *superstep,
                    vertex_count: *vertex_count,
                    edge_count: *edge_count,
                    worker_count,
                    recovery_step,
                    aggregators,
                };
                master_context.post_compensation(&mut env)
            };

            self.recovery.advance(more_rounds);
            if *self.recovery.phase() == RecoveryPhase::Done {
                break;
            }
        }

        self.recovery.finish();
        info!("compensation complete, resuming supersteps");
        Ok(())
    }
}

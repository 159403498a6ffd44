//! Wires a node together: sequencer, HTTP/WebSocket server and one dialer
//! per configured link direction.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::config::NodeConfig;
use crate::replication::{Dialer, Role};
use crate::sequencer::{Sequencer, SequencerHandle};
use crate::shutdown;

/// How long background tasks get to finish after shutdown before they are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Node {
    listener: TcpListener,
    config: NodeConfig,
    sequencer: Sequencer,
    handle: SequencerHandle,
}

impl Node {
    pub fn new(listener: TcpListener, config: NodeConfig) -> Self {
        let (sequencer, handle) = Sequencer::new(config.name.clone(), config.queue_capacity);
        Self {
            listener,
            config,
            sequencer,
            handle,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to this node's sequencer, usable before and while the node runs.
    pub fn handle(&self) -> SequencerHandle {
        self.handle.clone()
    }

    /// Serves and replicates until `signal` resolves, then stops every task.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Node {
            listener,
            config,
            sequencer,
            handle,
        } = self;
        tokio::pin!(signal);

        let (trigger, stop) = shutdown::channel();
        let mut tasks = JoinSet::new();
        tasks.spawn(sequencer.run(stop.clone()));
        spawn_dialers(&mut tasks, &config, &handle, &stop);

        let app = api::router(AppState {
            sequencer: handle,
            shutdown: stop.clone(),
        });
        let mut server_stop = stop;
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_stop.wait().await })
                .await
        });

        let early_exit = tokio::select! {
            _ = &mut signal => None,
            joined = &mut server => Some(joined),
        };

        info!(name = %config.name, "node shutting down");
        trigger.trigger();

        let result = match early_exit {
            Some(joined) => joined
                .context("http server task panicked")?
                .context("http server failed"),
            None => match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(joined) => joined
                    .context("http server task panicked")?
                    .context("http server failed"),
                Err(_) => {
                    warn!("http server did not stop in time; aborting");
                    server.abort();
                    Ok(())
                }
            },
        };

        drain(tasks).await;
        result
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn spawn_dialers(
    tasks: &mut JoinSet<()>,
    config: &NodeConfig,
    handle: &SequencerHandle,
    stop: &shutdown::Shutdown,
) {
    for link in &config.links {
        let roles = [
            (link.direction.pulls(), Role::Pull),
            (link.direction.pushes(), Role::Push),
        ];
        for (enabled, role) in roles {
            if !enabled {
                continue;
            }
            info!(
                peer = %link.target,
                direction = ?link.direction,
                %role,
                "starting replication dialer"
            );
            let dialer = Dialer::new(
                link.target.clone(),
                role,
                handle.clone(),
                config.reconnect_delay,
            );
            tasks.spawn(dialer.run(stop.clone()));
        }
    }
}

async fn drain(mut tasks: JoinSet<()>) {
    let finished = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = ?err, "background task ended abnormally");
            }
        }
    })
    .await;

    if finished.is_err() {
        warn!("background tasks did not stop in time; aborting");
        tasks.abort_all();
    }
}

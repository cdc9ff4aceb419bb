use super::executor::Executor;
use super::queue::{self, QueueProducer};
use super::session::{self, Session, TelemetryLink, TelemetryRoute};
use super::telemetry::{self, SpeedGauge, TelemetryState};
use crate::actuation::ActuationBackend;
use crate::config::Config;
use crate::utils::error::Result;
use async_std::channel::Receiver;
use async_std::future::timeout;
use async_std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use async_std::task;
use futures::FutureExt;
use futures::future::Fuse;
use std::net::Shutdown;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Main motor server structure: the connection manager.
///
/// Owns the listening sockets, the shared telemetry state and the execution
/// loop. Serves one controller at a time.
pub struct MotorServer {
    config: Config,
    command_listener: TcpListener,
    telemetry_listener: Option<TcpListener>,
    backend: Arc<dyn ActuationBackend>,
    telemetry: Arc<TelemetryState>,
    gauge: Arc<SpeedGauge>,
    sessions_served: u64,
}

impl MotorServer {
    /// Bind the command socket and, when configured, the telemetry socket
    pub async fn bind(config: Config, backend: Arc<dyn ActuationBackend>) -> Result<Self> {
        let ip: IpAddr = config.server.bind_addr.parse()?;

        let command_listener = TcpListener::bind((ip, config.server.command_port)).await?;
        let telemetry_listener = match config.server.telemetry_port {
            Some(port) => Some(TcpListener::bind((ip, port)).await?),
            None => None,
        };

        Ok(Self {
            telemetry: Arc::new(TelemetryState::new(config.telemetry.interval())),
            gauge: Arc::new(SpeedGauge::new()),
            config,
            command_listener,
            telemetry_listener,
            backend,
            sessions_served: 0,
        })
    }

    pub fn command_addr(&self) -> Result<SocketAddr> {
        Ok(self.command_listener.local_addr()?)
    }

    pub fn telemetry_addr(&self) -> Result<Option<SocketAddr>> {
        match &self.telemetry_listener {
            Some(listener) => Ok(Some(listener.local_addr()?)),
            None => Ok(None),
        }
    }

    /// Run the accept loop until a shutdown signal arrives
    ///
    /// # Arguments
    /// * `shutdown_rx` - Receiver for shutdown signal; a closed channel counts as a signal
    pub async fn run(mut self, shutdown_rx: Receiver<()>) -> Result<()> {
        let (producer, consumer) = queue::command_queue();
        let executor = Executor::new(
            self.backend.clone(),
            self.telemetry.clone(),
            self.gauge.clone(),
            self.config.actuation.timeout(),
            self.config.actuation.default_acceleration,
        );
        let execution_loop = task::spawn(executor.run(consumer));

        loop {
            info!(
                "Listening for controller on {}",
                self.command_listener.local_addr()?
            );

            let accepted = futures::select! {
                accepted = self.command_listener.accept().fuse() => accepted,
                _ = shutdown_rx.recv().fuse() => {
                    info!("Shutdown signal received, stopping accept loop");
                    break;
                }
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    task::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let session = self.open_session(stream, peer).await;
            if self.serve(session, &producer, &shutdown_rx).await {
                break;
            }
        }

        producer.close();
        execution_loop.await;
        info!("Motor server stopped");
        Ok(())
    }

    /// Completes the handshake for a new controller
    async fn open_session(&mut self, stream: TcpStream, peer: SocketAddr) -> Arc<Session> {
        info!("Controller connected from {}", peer);

        let route = match &self.telemetry_listener {
            None => TelemetryRoute::Shared,
            Some(listener) => {
                let wait = self.config.server.telemetry_accept_timeout();
                match accept_telemetry(listener, peer, wait).await {
                    Some(link) => TelemetryRoute::Dedicated(link),
                    None => {
                        warn!(
                            "No telemetry connection within {:?}, waiting for it in the background",
                            wait
                        );
                        TelemetryRoute::Unavailable
                    }
                }
            }
        };

        self.sessions_served += 1;
        Arc::new(Session::new(self.sessions_served, peer, stream, route))
    }

    /// Attaches a telemetry socket that the controller opened after the handshake
    async fn adopt_late_telemetry(&self, session: &Session) {
        let Some(listener) = &self.telemetry_listener else {
            return;
        };
        loop {
            match listener.accept().await {
                Ok((link, link_peer)) if link_peer.ip() == session.peer().ip() => {
                    info!(
                        "Late telemetry channel from {} joined session {}",
                        link_peer,
                        session.id()
                    );
                    session.attach_telemetry(TelemetryLink::new(link));
                    return;
                }
                Ok((link, link_peer)) => reject_telemetry(link, link_peer, session.peer()),
                Err(e) => {
                    warn!("Telemetry accept failed: {}", e);
                    task::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Closes telemetry connections the ended session opened too late to use,
    /// so they are never paired with the next controller.
    fn sweep_stale_telemetry(&self, session: &Session) {
        let Some(listener) = &self.telemetry_listener else {
            return;
        };
        while let Some(accepted) = listener.accept().now_or_never() {
            match accepted {
                Ok((link, link_peer)) if link_peer.ip() == session.peer().ip() => {
                    info!(
                        "Closing telemetry connection from {} left over by session {}",
                        link_peer,
                        session.id()
                    );
                    let _ = link.shutdown(Shutdown::Both);
                }
                Ok((link, link_peer)) => reject_telemetry(link, link_peer, session.peer()),
                Err(e) => {
                    warn!("Telemetry accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Serves one session to the end. Returns true if shutdown was requested.
    async fn serve(
        &self,
        session: Arc<Session>,
        producer: &QueueProducer,
        shutdown_rx: &Receiver<()>,
    ) -> bool {
        self.telemetry.reset();

        let reader = task::spawn(session::read_loop(
            session.clone(),
            producer.clone(),
            self.config.protocol.acknowledge_receipt,
        ))
        .fuse();
        let reporter = task::spawn(telemetry::telemetry_loop(
            session.clone(),
            self.telemetry.clone(),
            self.gauge.clone(),
        ));
        let adopter = if session.awaits_telemetry() {
            self.adopt_late_telemetry(&session).fuse()
        } else {
            Fuse::terminated()
        };
        futures::pin_mut!(reader, adopter);

        let shutdown = loop {
            futures::select! {
                _ = reader => break false,
                _ = shutdown_rx.recv().fuse() => break true,
                _ = adopter => {}
            }
        };
        if shutdown {
            info!("Shutdown signal received, closing session {}", session.id());
            session.close();
            reader.await;
        }
        if session.awaits_telemetry() {
            self.sweep_stale_telemetry(&session);
        }

        info!(
            "Session {} ended, {} command(s) still queued",
            session.id(),
            producer.len()
        );
        match producer.end_session(session.clone()) {
            Ok(acknowledged) => {
                let _ = acknowledged.recv().await;
            }
            Err(e) => warn!("Cannot drain session {}: {}", session.id(), e),
        }
        session.close();
        reporter.await;

        info!("Ready for the next controller");
        shutdown
    }
}

/// Waits up to `wait` for the telemetry socket of the controller at `peer`.
///
/// Connections from any other host are closed and do not end the wait.
async fn accept_telemetry(
    listener: &TcpListener,
    peer: SocketAddr,
    wait: Duration,
) -> Option<TelemetryLink> {
    let deadline = Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, listener.accept()).await {
            Ok(Ok((link, link_peer))) if link_peer.ip() == peer.ip() => {
                info!("Telemetry channel connected from {}", link_peer);
                return Some(TelemetryLink::new(link));
            }
            Ok(Ok((link, link_peer))) => reject_telemetry(link, link_peer, peer),
            Ok(Err(e)) => {
                warn!("Telemetry accept failed: {}", e);
                return None;
            }
            Err(_) => return None,
        }
    }
}

fn reject_telemetry(link: TcpStream, link_peer: SocketAddr, owner: SocketAddr) {
    warn!(
        "Rejecting telemetry connection from {}, the session belongs to {}",
        link_peer, owner
    );
    let _ = link.shutdown(Shutdown::Both);
}

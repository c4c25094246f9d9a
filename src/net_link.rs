use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::audio::CapturedFrame;
use crate::config::Config;
use crate::protocol::{ClientContentMessage, LiveServerMessage, RealtimeInputMessage, SetupMessage};
use crate::session::SessionEvent;

#[derive(Debug)]
pub enum NetCommand {
    SendAudio(CapturedFrame),
    SendText(String),
    Close,
}

/// WebSocket link to the live service.
///
/// Inbound frames are translated into `SessionEvent`s for the session queue; outbound
/// `NetCommand`s are serialized onto the socket.
pub struct NetLink {
    url: Url,
    model: String,
    system_instruction: String,
    reconnect_attempts: u32,
    output_sample_rate: u32,
    output_channels: u16,
    /// The current connection got as far as `Connected`
    established: bool,
    tx: mpsc::Sender<SessionEvent>,
    rx_cmd: mpsc::Receiver<NetCommand>,
}

/// Delay before reconnect attempt `attempt` (0-based): 1s, 2s, 4s ... capped at 60s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(60))
}

impl NetLink {
    pub fn new(
        config: &Config,
        system_instruction: String,
        tx: mpsc::Sender<SessionEvent>,
        rx_cmd: mpsc::Receiver<NetCommand>,
    ) -> anyhow::Result<Self> {
        let mut url = Url::parse(config.live_ws_url)?;
        url.query_pairs_mut().append_pair("key", &config.api_key);
        Ok(Self {
            url,
            model: config.live_model.to_string(),
            system_instruction,
            reconnect_attempts: config.reconnect_attempts,
            output_sample_rate: config.output_sample_rate,
            output_channels: config.output_channels,
            established: false,
            tx,
            rx_cmd,
        })
    }

    /// Run until closed by command or until reconnects are exhausted. Always ends
    /// with `SessionEvent::Closed`. The attempt budget starts over after every
    /// connection that was established.
    pub async fn run(mut self) {
        let mut attempt = 0;
        loop {
            let result = self.connect_and_loop().await;
            if std::mem::take(&mut self.established) {
                attempt = 0;
            }
            match result {
                Ok(()) => break,
                Err(e) if attempt < self.reconnect_attempts => {
                    let delay = backoff_delay(attempt);
                    log::warn!("Live connection error: {:#}. Retrying in {}s...", e, delay.as_secs());
                    attempt += 1;
                    if self.tx.send(SessionEvent::Disconnected).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    log::error!("Live connection error: {:#}", e);
                    break;
                }
            }
        }
        let _ = self.tx.send(SessionEvent::Closed).await;
    }

    async fn connect_and_loop(&mut self) -> anyhow::Result<()> {
        log::info!(
            "Connecting to {}://{}{}...",
            self.url.scheme(),
            self.url.host_str().unwrap_or("?"),
            self.url.path()
        );
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();
        log::info!("Live link connected");

        self.tx.send(SessionEvent::Connected).await?;
        self.established = true;

        let setup = SetupMessage::new(&self.model, &self.system_instruction);
        write.send(Message::Text(to_json(&setup)?.into())).await?;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.forward_frame(text.as_bytes()).await?,
                        // the service sends its JSON in binary frames
                        Some(Ok(Message::Binary(data))) => self.forward_frame(&data).await?,
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("Server closed connection: {:?}", frame);
                            anyhow::bail!("Connection closed");
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => anyhow::bail!("Connection closed"),
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    match cmd {
                        Some(NetCommand::SendAudio(frame)) => {
                            let msg = RealtimeInputMessage::from(frame);
                            write.send(Message::Text(to_json(&msg)?.into())).await?;
                        }
                        Some(NetCommand::SendText(text)) => {
                            let msg = ClientContentMessage::user_text(&text);
                            write.send(Message::Text(to_json(&msg)?.into())).await?;
                        }
                        Some(NetCommand::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn forward_frame(&self, data: &[u8]) -> anyhow::Result<()> {
        let msg: LiveServerMessage = match serde_json::from_slice(data) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("Ignoring unparseable live frame: {}", e);
                return Ok(());
            }
        };
        for event in msg.into_events(self.output_sample_rate, self.output_channels) {
            self.tx.send(event).await?;
        }
        Ok(())
    }
}

fn to_json<T: Serialize>(msg: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string(msg)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let secs: Vec<u64> = (0..8).map(|a| backoff_delay(a).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 60, 60]);
        assert_eq!(backoff_delay(200).as_secs(), 60);
    }

    #[test]
    fn api_key_goes_into_the_query() {
        let mut config = Config::default();
        config.api_key = "k&y".to_string();
        let (tx, _rx) = mpsc::channel(1);
        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let link = NetLink::new(&config, String::new(), tx, cmd_rx).unwrap();
        assert_eq!(link.url.query(), Some("key=k%26y"));
    }

    #[tokio::test]
    async fn frames_are_forwarded_as_events() {
        let config = Config::default();
        let (tx, mut rx) = mpsc::channel(8);
        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let link = NetLink::new(&config, String::new(), tx, cmd_rx).unwrap();

        link.forward_frame(br#"{"serverContent":{"interrupted":true}}"#).await.unwrap();
        link.forward_frame(b"not json").await.unwrap();

        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Interrupted)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn retry_budget_resets_after_each_established_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // accept three sessions, hang up on each, then stop listening
            for _ in 0..3 {
                let (stream, _) = listener.accept().await.unwrap();
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                drop(ws);
            }
        });

        let mut config = Config::default();
        config.live_ws_url = Box::leak(format!("ws://{}/live", addr).into_boxed_str());
        config.reconnect_attempts = 1;
        let (tx, mut rx) = mpsc::channel(32);
        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let link = NetLink::new(&config, String::new(), tx, cmd_rx).unwrap();
        let task = tokio::spawn(link.run());

        let mut connected = 0;
        let mut disconnected = 0;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(20), rx.recv()).await.unwrap();
            match event {
                Some(SessionEvent::Connected) => connected += 1,
                Some(SessionEvent::Disconnected) => disconnected += 1,
                Some(SessionEvent::Closed) | None => break,
                Some(_) => {}
            }
        }
        assert_eq!(connected, 3);
        assert_eq!(disconnected, 3);
        server.await.unwrap();
        task.await.unwrap();
    }
}

//! # WebSocket Audio Ingestion Handler
//!
//! Clients connect to `/ws`, pick a recording mode with `start_audio`, stream
//! audio as binary frames (or upload it base64-encoded) and get back one
//! `audio_saved` event per finished recording.
//!
//! ## Connection Lifecycle:
//! 1. **Upgrade**: Refused with 503 once `max_concurrent_sessions` is reached
//! 2. **Frames**: Each frame is handed to the connection's [`IngestionMachine`]
//! 3. **Replies**: At most one JSON event per frame, in frame order
//! 4. **Close**: The slot is released; nothing else needs cleaning up
//!
//! ## Ordering:
//! Finalizing a recording runs ffmpeg and the transcription engine, which can
//! take seconds. The machine is moved into a spawned tokio task for each
//! frame, and the actor suspends itself with `ctx.wait` until the task hands
//! the machine back. Later frames stay queued in the meantime, so they are
//! always handled after the reply to the earlier one. Other connections are
//! unaffected.
//!
//! If the client disconnects mid-finalize, the task still runs to the end
//! (the input file is removed and the output kept); only the reply is lost.
//! A panic inside a frame handler is reported as an `error` event and the
//! connection carries on with a fresh, idle session.

use crate::audio::ingest::IngestionMachine;
use crate::audio::pipeline::FinalizePipeline;
use crate::error::AppError;
use crate::protocol::{Frame, ServerEvent};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the server pings an idle client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// A client that answers nothing for this long is disconnected.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor for one audio ingestion connection.
///
/// ## Actor Model:
/// Each connection is an independent actor; its recording state lives in
/// `machine` and is never shared.
pub struct AudioWebSocket {
    /// `None` only while a frame is being handled in a spawned task
    machine: Option<IngestionMachine>,

    pipeline: Arc<FinalizePipeline>,

    /// Metrics sink
    app_state: web::Data<AppState>,

    /// Last sign of life from the client
    last_heartbeat: Instant,
}

impl AudioWebSocket {
    pub fn new(app_state: web::Data<AppState>) -> Self {
        let pipeline = app_state.pipeline.clone();
        Self {
            machine: Some(IngestionMachine::new(pipeline.clone())),
            pipeline,
            app_state,
            last_heartbeat: Instant::now(),
        }
    }

    /// Run one frame through the state machine without blocking the thread,
    /// and without letting any later frame overtake it.
    fn dispatch(&mut self, frame: Frame, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(mut machine) = self.machine.take() else {
            // ctx.wait stops the stream while a frame is in flight.
            error!("Frame received while another frame was still being handled");
            return;
        };

        let task = tokio::spawn(async move {
            let reply = machine.handle_frame(frame).await;
            (machine, reply)
        });

        ctx.wait(async move { task.await }.into_actor(self).map(|joined, act, ctx| {
            // Pongs could not be processed while waiting.
            act.last_heartbeat = Instant::now();

            match joined {
                Ok((machine, reply)) => {
                    act.machine = Some(machine);
                    if let Some(event) = reply {
                        act.send_event(event, ctx);
                    }
                }
                Err(err) => {
                    error!("Frame handler panicked, resetting session: {}", err);
                    act.machine = Some(IngestionMachine::new(act.pipeline.clone()));
                    act.send_event(
                        ServerEvent::Error("Internal error while handling frame".to_string()),
                        ctx,
                    );
                }
            }
        }));
    }

    fn send_event(&self, event: ServerEvent, ctx: &mut ws::WebsocketContext<Self>) {
        self.app_state.record_ingest_event(&event);
        match serde_json::to_string(&event) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize server event: {}", err),
        }
    }
}

impl Actor for AudioWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection started");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if self.machine.is_none() {
            debug!("Connection closed while finalizing; the reply will be dropped");
        }
        self.app_state.close_session();
        info!("WebSocket connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.dispatch(Frame::Text(text.to_string()), ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                debug!(bytes = data.len(), "Binary frame received");
                self.dispatch(Frame::Binary(data), ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// Reserves a connection slot, then hands the request to the
/// [`AudioWebSocket`] actor. The frame size limit comes from
/// `performance.max_frame_bytes`, since whole recordings arrive as single
/// frames in `blob` and `raw` mode.
pub async fn audio_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let performance = &app_state.config().performance;
    let max_sessions = performance.max_concurrent_sessions;
    let max_frame_bytes = performance.max_frame_bytes;

    if !app_state.try_open_session(max_sessions) {
        warn!(max_sessions, "Rejecting WebSocket connection: session limit reached");
        return Err(AppError::Unavailable(format!(
            "Maximum concurrent sessions ({}) reached",
            max_sessions
        ))
        .into());
    }

    info!("New WebSocket connection from: {:?}", req.connection_info().peer_addr());

    let actor = AudioWebSocket::new(app_state.clone());
    let response = ws::WsResponseBuilder::new(actor, &req, stream)
        .frame_size(max_frame_bytes)
        .start();

    if response.is_err() {
        // The actor never started, so `stopped` will not release the slot.
        app_state.close_session();
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::protocol::AudioSaved;
    use crate::test_support::{pipeline_with, MockTranscoder, MockTranscriber, PanickingTranscriber};
    use actix_web::{App, HttpServer};
    use futures_util::{SinkExt, Stream, StreamExt};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::path::Path;
    use tokio_tungstenite::tungstenite::Message;

    fn start_server(root: &Path, max_sessions: usize) -> SocketAddr {
        let pipeline = pipeline_with(root, MockTranscoder::new(), MockTranscriber::new("  hello world  "));
        serve(pipeline, max_sessions)
    }

    fn serve(pipeline: Arc<FinalizePipeline>, max_sessions: usize) -> SocketAddr {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_sessions = max_sessions;
        let state = AppState::new(config, pipeline);

        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/ws", web::get().to(audio_websocket))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        addr
    }

    async fn next_event<S>(stream: &mut S) -> ServerEvent
    where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match stream.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    fn files_in(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn text(value: serde_json::Value) -> Message {
        Message::Text(value.to_string().into())
    }

    #[actix_web::test]
    async fn test_chunked_recording_over_websocket() {
        let dir = tempfile::tempdir().unwrap();
        let addr = start_server(dir.path(), 4);

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();

        let start = json!({"event": "start_audio", "payload": {"id": "e2e", "mode": "chunk"}});
        socket.send(Message::Text(start.to_string().into())).await.unwrap();
        assert_eq!(next_event(&mut socket).await, ServerEvent::ReadyForAudio);

        for chunk in [&b"abc"[..], b"def", b"ghi"] {
            socket.send(Message::Binary(chunk.to_vec().into())).await.unwrap();
        }
        socket
            .send(Message::Text(json!({"event": "stop_audio"}).to_string().into()))
            .await
            .unwrap();
        // Sent while the recording is still being finalized; must be answered after it.
        socket
            .send(Message::Text(json!({"event": "ping", "payload": 42}).to_string().into()))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut socket).await,
            ServerEvent::AudioSaved(AudioSaved {
                id: "e2e".into(),
                url: "/audio/e2e.mp3".into(),
                transcript: "hello world".into(),
            })
        );
        assert_eq!(next_event(&mut socket).await, ServerEvent::Pong(json!(42)));

        assert_eq!(std::fs::read(dir.path().join("e2e.mp3")).unwrap(), b"abcdefghi");
        assert!(!dir.path().join("e2e.webm").exists());
    }

    #[actix_web::test]
    async fn test_blob_larger_than_default_frame_limit_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let addr = start_server(dir.path(), 4);

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        socket
            .send(text(json!({"event": "start_audio", "payload": {"id": "big", "mode": "blob"}})))
            .await
            .unwrap();
        assert_eq!(next_event(&mut socket).await, ServerEvent::ReadyForAudio);

        let blob = vec![7u8; 256 * 1024];
        socket.send(Message::Binary(blob.clone().into())).await.unwrap();

        match next_event(&mut socket).await {
            ServerEvent::AudioSaved(saved) => assert_eq!(saved.url, "/audio/big.mp3"),
            other => panic!("expected audio_saved, got {other:?}"),
        }
        assert_eq!(std::fs::read(dir.path().join("big.mp3")).unwrap(), blob);
    }

    #[actix_web::test]
    async fn test_errors_keep_connection_open() {
        let dir = tempfile::tempdir().unwrap();
        let addr = start_server(dir.path(), 4);

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();

        socket.send(Message::Binary(b"early".to_vec().into())).await.unwrap();
        assert_eq!(
            next_event(&mut socket).await,
            ServerEvent::Error("Received binary data, but audio mode not set".into())
        );

        socket.send(Message::Text("not json".to_string().into())).await.unwrap();
        assert_eq!(next_event(&mut socket).await, ServerEvent::Error("Invalid JSON".into()));

        socket
            .send(Message::Text(json!({"event": "ping", "payload": "still here"}).to_string().into()))
            .await
            .unwrap();
        assert_eq!(next_event(&mut socket).await, ServerEvent::Pong(json!("still here")));
    }

    #[actix_web::test]
    async fn test_connections_beyond_cap_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let addr = start_server(dir.path(), 1);
        let url = format!("ws://{}/ws", addr);

        let (_first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        assert!(tokio_tungstenite::connect_async(url.as_str()).await.is_err());
    }

    #[actix_web::test]
    async fn test_disconnect_mid_finalize_still_completes_recording() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = MockTranscoder::new().with_delay(Duration::from_millis(500));
        let addr = serve(pipeline_with(dir.path(), transcoder, MockTranscriber::new("late")), 4);

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        socket
            .send(text(json!({"event": "start_audio", "payload": {"id": "d", "mode": "raw"}})))
            .await
            .unwrap();
        assert_eq!(next_event(&mut socket).await, ServerEvent::ReadyForAudio);

        socket.send(Message::Binary(b"pcm".to_vec().into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(socket);

        let deadline = Instant::now() + Duration::from_secs(5);
        while files_in(dir.path()) != ["d.mp3"] && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(files_in(dir.path()), ["d.mp3"]);
        assert_eq!(std::fs::read(dir.path().join("d.mp3")).unwrap(), b"pcm");
    }

    #[actix_web::test]
    async fn test_panicking_frame_resets_session() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve(pipeline_with(dir.path(), MockTranscoder::new(), PanickingTranscriber), 4);

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        socket
            .send(text(json!({"event": "start_audio", "payload": {"id": "p", "mode": "raw"}})))
            .await
            .unwrap();
        assert_eq!(next_event(&mut socket).await, ServerEvent::ReadyForAudio);

        socket.send(Message::Binary(b"pcm".to_vec().into())).await.unwrap();
        assert_eq!(
            next_event(&mut socket).await,
            ServerEvent::Error("Internal error while handling frame".into())
        );

        socket.send(text(json!({"event": "ping", "payload": 7}))).await.unwrap();
        assert_eq!(next_event(&mut socket).await, ServerEvent::Pong(json!(7)));

        // The replacement session starts out idle.
        socket.send(Message::Binary(b"more".to_vec().into())).await.unwrap();
        assert_eq!(
            next_event(&mut socket).await,
            ServerEvent::Error("Received binary data, but audio mode not set".into())
        );
        assert!(!dir.path().join("p.wav").exists());
    }
}

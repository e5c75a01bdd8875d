use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};

use crate::color::{TEMPERATURE_NORM, Temperature};
use crate::display::{self, GammaDisplay, Invocation, Request, ScreenReport, Target};
use crate::model::ColorModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcCommand {
    #[serde(rename = "get_temperature")]
    GetTemperature {
        #[serde(default)]
        target: Target,
        #[serde(default)]
        model: ColorModel,
    },
    #[serde(rename = "set_temperature")]
    SetTemperature {
        temperature: Temperature,
        #[serde(default)]
        target: Target,
        #[serde(default)]
        model: ColorModel,
    },
    #[serde(rename = "shift_temperature")]
    ShiftTemperature {
        delta: Temperature,
        #[serde(default)]
        target: Target,
        #[serde(default)]
        model: ColorModel,
    },
}

impl IpcCommand {
    pub fn invocation(&self) -> Invocation {
        let (request, target, model) = match *self {
            IpcCommand::GetTemperature { target, model } => (Request::Estimate, target, model),
            IpcCommand::SetTemperature {
                temperature,
                target,
                model,
            } => (Request::Set(temperature), target, model),
            IpcCommand::ShiftTemperature {
                delta,
                target,
                model,
            } => (Request::Shift(delta), target, model),
        };
        Invocation {
            request,
            target,
            model,
        }
    }
}

impl From<Invocation> for IpcCommand {
    fn from(invocation: Invocation) -> Self {
        let Invocation {
            request,
            target,
            model,
        } = invocation;
        match request {
            Request::Estimate => IpcCommand::GetTemperature { target, model },
            Request::Set(temperature) => IpcCommand::SetTemperature {
                temperature,
                target,
                model,
            },
            Request::Shift(delta) => IpcCommand::ShiftTemperature {
                delta,
                target,
                model,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    #[serde(rename = "status")]
    Status { screens: Vec<ScreenReport> },
    #[serde(rename = "error")]
    Error { message: String },
}

impl IpcResponse {
    /// True when `request` left some screen away from neutral. Such a ramp
    /// only lasts while the gamma controls stay alive.
    pub fn holds_gamma(&self, request: Request) -> bool {
        if !request.changes_gamma() {
            return false;
        }
        match self {
            IpcResponse::Status { screens } => screens
                .iter()
                .any(|report| report.temperature.is_some_and(|t| t != TEMPERATURE_NORM)),
            IpcResponse::Error { .. } => false,
        }
    }
}

/// A request forwarded to the task that owns the display.
pub type IpcRequest = (Invocation, oneshot::Sender<IpcResponse>);

pub fn respond<D: GammaDisplay + ?Sized>(display: &mut D, invocation: &Invocation) -> IpcResponse {
    match display::run(display, invocation) {
        Ok(screens) => IpcResponse::Status { screens },
        Err(err) => IpcResponse::Error {
            message: err.to_string(),
        },
    }
}

/// Removes the socket file when the holder exits.
pub struct SocketGuard(PathBuf);

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Binds the control socket, replacing a stale file left by a dead holder.
pub fn bind_socket(path: &Path) -> Result<(UnixListener, SocketGuard)> {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err).context("remove stale socket"),
    }
    let listener = UnixListener::bind(path)
        .with_context(|| format!("bind control socket {}", path.display()))?;
    Ok((listener, SocketGuard(path.to_path_buf())))
}

pub async fn start_socket_server(
    listener: UnixListener,
    request_tx: mpsc::UnboundedSender<IpcRequest>,
) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let request_tx = request_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, request_tx).await {
                tracing::warn!("control client error: {e:#}");
            }
        });
    }
}

async fn handle_client(
    stream: UnixStream,
    request_tx: mpsc::UnboundedSender<IpcRequest>,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break; // EOF
        }
        let response = match serde_json::from_str::<IpcCommand>(line.trim()) {
            Ok(command) => forward(command.invocation(), &request_tx).await,
            Err(e) => IpcResponse::Error {
                message: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)?;
        write_half.write_all(response_json.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
        write_half.flush().await?;
    }
    Ok(())
}

async fn forward(
    invocation: Invocation,
    request_tx: &mpsc::UnboundedSender<IpcRequest>,
) -> IpcResponse {
    let (reply_tx, reply_rx) = oneshot::channel();
    if request_tx.send((invocation, reply_tx)).is_err() {
        return IpcResponse::Error {
            message: "display is shutting down".to_string(),
        };
    }
    reply_rx.await.unwrap_or_else(|_| IpcResponse::Error {
        message: "request dropped".to_string(),
    })
}

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Hands the command to a running holder. `None` means the caller has to
/// drive the display itself, including when the socket misbehaves.
pub async fn forward_to_holder(path: &Path, command: &IpcCommand) -> Option<IpcResponse> {
    match send_command(path, command, RESPONSE_TIMEOUT).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(path = %path.display(), "control socket unusable: {err:#}");
            None
        }
    }
}

/// Sends one command to a running holder. `None` when nobody listens on `path`.
pub async fn send_command(
    path: &Path,
    command: &IpcCommand,
    timeout: Duration,
) -> Result<Option<IpcResponse>> {
    let stream = match UnixStream::connect(path).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::debug!(path = %path.display(), "no running instance: {err}");
            return Ok(None);
        }
    };
    let (read_half, mut write_half) = stream.into_split();
    let mut request = serde_json::to_string(command)?;
    request.push('\n');
    write_half.write_all(request.as_bytes()).await?;
    write_half.flush().await?;

    let mut line = String::new();
    let mut reader = BufReader::new(read_half);
    tokio::time::timeout(timeout, reader.read_line(&mut line))
        .await
        .context("control response timed out")?
        .context("read control response")?;
    let response = serde_json::from_str(line.trim()).context("parse control response")?;
    Ok(Some(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::tests::FakeDisplay;

    /// Serves requests from a fake display until every sender is gone.
    fn spawn_holder(mut display: FakeDisplay) -> mpsc::UnboundedSender<IpcRequest> {
        let (tx, mut rx) = mpsc::unbounded_channel::<IpcRequest>();
        tokio::spawn(async move {
            while let Some((invocation, reply)) = rx.recv().await {
                let _ = reply.send(respond(&mut display, &invocation));
            }
        });
        tx
    }

    #[test]
    fn command_wire_format() {
        let command: IpcCommand =
            serde_json::from_str(r#"{"type":"set_temperature","temperature":3000}"#).unwrap();
        let invocation = command.invocation();
        assert_eq!(invocation.request, Request::Set(3000));
        assert_eq!(invocation.target, Target::default());
        assert_eq!(invocation.model, ColorModel::Analytic);

        let command: IpcCommand = serde_json::from_str(
            r#"{"type":"shift_temperature","delta":-200,"target":{"screen":0,"crtc":null},"model":"table"}"#,
        )
        .unwrap();
        assert_eq!(command.invocation().request, Request::Shift(-200));
        assert_eq!(command.invocation().model, ColorModel::Table);
    }

    #[test]
    fn invocation_survives_conversion() {
        let invocation = Invocation {
            request: Request::Shift(150),
            target: Target {
                screen: Some(0),
                crtc: None,
            },
            model: ColorModel::Table,
        };
        assert_eq!(IpcCommand::from(invocation).invocation(), invocation);
    }

    #[test]
    fn response_wire_format() {
        let response = IpcResponse::Status {
            screens: vec![ScreenReport {
                screen: 0,
                temperature: Some(4200),
            }],
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"type":"status","screens":[{"screen":0,"temperature":4200}]}"#
        );
    }

    #[test]
    fn invalid_screen_becomes_error_response() {
        let mut display = FakeDisplay::with_sizes(&[&[256]]);
        let invocation = IpcCommand::GetTemperature {
            target: Target {
                screen: Some(2),
                crtc: None,
            },
            model: ColorModel::Analytic,
        }
        .invocation();
        assert!(matches!(
            respond(&mut display, &invocation),
            IpcResponse::Error { .. }
        ));
    }

    #[tokio::test]
    async fn socket_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wlsct.sock");
        let (listener, _guard) = bind_socket(&path).unwrap();
        let tx = spawn_holder(FakeDisplay::with_sizes(&[&[1024, 256]]));
        tokio::spawn(start_socket_server(listener, tx));

        let set = IpcCommand::SetTemperature {
            temperature: 2800,
            target: Target::default(),
            model: ColorModel::Analytic,
        };
        let response = send_command(&path, &set, RESPONSE_TIMEOUT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            response,
            IpcResponse::Status {
                screens: vec![ScreenReport {
                    screen: 0,
                    temperature: Some(2800)
                }]
            }
        );

        let get = IpcCommand::GetTemperature {
            target: Target::default(),
            model: ColorModel::Analytic,
        };
        let Some(IpcResponse::Status { screens }) =
            send_command(&path, &get, RESPONSE_TIMEOUT).await.unwrap()
        else {
            panic!("expected status");
        };
        let estimate = screens[0].temperature.unwrap();
        assert!((estimate - 2800).abs() <= 2, "{estimate}");
    }

    #[tokio::test]
    async fn malformed_line_gets_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wlsct.sock");
        let (listener, _guard) = bind_socket(&path).unwrap();
        let tx = spawn_holder(FakeDisplay::with_sizes(&[&[256]]));
        tokio::spawn(start_socket_server(listener, tx));

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"{\"type\":\"dim\"}\n").await.unwrap();
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).await.unwrap();
        let response: IpcResponse = serde_json::from_str(line.trim()).unwrap();
        assert!(matches!(response, IpcResponse::Error { .. }));
    }

    #[tokio::test]
    async fn nobody_listening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");
        let response = send_command(&path, &get_temperature(), RESPONSE_TIMEOUT).await;
        assert_eq!(response.unwrap(), None);
    }

    fn get_temperature() -> IpcCommand {
        IpcCommand::GetTemperature {
            target: Target::default(),
            model: ColorModel::Analytic,
        }
    }

    #[tokio::test]
    async fn dropped_connection_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wlsct.sock");
        let (listener, _guard) = bind_socket(&path).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                drop(stream);
            }
        });

        let command = get_temperature();
        assert!(send_command(&path, &command, RESPONSE_TIMEOUT).await.is_err());
        assert_eq!(forward_to_holder(&path, &command).await, None);
    }

    #[tokio::test]
    async fn silent_holder_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wlsct.sock");
        let (listener, _guard) = bind_socket(&path).unwrap();

        let command = get_temperature();
        let (response, accepted) = tokio::join!(
            send_command(&path, &command, Duration::from_millis(50)),
            listener.accept()
        );
        let _stream = accepted.unwrap();
        let err = response.unwrap_err();
        assert!(format!("{err:#}").contains("timed out"), "{err:#}");
    }

    #[test]
    fn only_warm_or_cool_results_are_held() {
        let status = |temperature| IpcResponse::Status {
            screens: vec![
                ScreenReport {
                    screen: 0,
                    temperature: None,
                },
                ScreenReport {
                    screen: 1,
                    temperature,
                },
            ],
        };
        assert!(status(Some(3000)).holds_gamma(Request::Set(3000)));
        assert!(status(Some(7200)).holds_gamma(Request::Shift(700)));
        assert!(!status(Some(6500)).holds_gamma(Request::Set(0)));
        assert!(!status(None).holds_gamma(Request::Set(3000)));
        assert!(!status(Some(3000)).holds_gamma(Request::Estimate));
        let error = IpcResponse::Error {
            message: "no screen".to_string(),
        };
        assert!(!error.holds_gamma(Request::Set(3000)));
    }

    #[test]
    fn reset_is_not_held() {
        let mut display = FakeDisplay::with_sizes(&[&[256]]);
        let invocation = |request| Invocation {
            request,
            target: Target::default(),
            model: ColorModel::Analytic,
        };
        let reset = respond(&mut display, &invocation(Request::Set(0)));
        assert!(!reset.holds_gamma(Request::Set(0)));
        let warm = respond(&mut display, &invocation(Request::Set(4000)));
        assert!(warm.holds_gamma(Request::Set(4000)));

        let mut unusable = FakeDisplay::with_sizes(&[&[0, 0]]);
        let response = respond(&mut unusable, &invocation(Request::Set(3000)));
        assert!(!response.holds_gamma(Request::Set(3000)));
    }

    #[tokio::test]
    async fn stale_socket_is_replaced_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wlsct.sock");
        std::fs::write(&path, b"").unwrap();
        let (_listener, guard) = bind_socket(&path).unwrap();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }
}

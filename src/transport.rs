// Line transports between the upstream controller and a hub
//
// The drive loop only needs "next line" and "write this frame". Reading is the
// loop's one suspension point: it waits until a line is available or the
// stream closes.

use std::collections::VecDeque;
use std::future::Future;
use std::io::{BufRead, BufReader, ErrorKind, Write};

use serialport::SerialPort;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::config::SERIAL_TIMEOUT;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Zenoh error: {0}")]
    Zenoh(String),

    #[error("Transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;

pub trait LineTransport {
    /// Next line without its terminator, `None` once the stream has closed
    fn read_line(&mut self) -> impl Future<Output = Result<Option<String>>>;

    /// Write `frame` exactly as given (callers add the newline when the protocol wants one)
    fn write_frame(&mut self, frame: &str) -> impl Future<Output = Result<()>>;
}

fn strip_terminator(line: &str) -> String {
    line.trim_end_matches(['\r', '\n']).to_string()
}

/// Process stdin/stdout, as used when the hub program is piped to the link
pub struct StdioTransport {
    stdin: tokio::io::BufReader<tokio::io::Stdin>,
    stdout: tokio::io::Stdout,
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            stdin: tokio::io::BufReader::new(tokio::io::stdin()),
            stdout: tokio::io::stdout(),
        }
    }
}

impl LineTransport for StdioTransport {
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.stdin.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(strip_terminator(&line)))
    }

    async fn write_frame(&mut self, frame: &str) -> Result<()> {
        self.stdout.write_all(frame.as_bytes()).await?;
        self.stdout.flush().await?;
        Ok(())
    }
}

/// Point-to-point serial link
///
/// `serialport` is blocking, so each read runs on the blocking pool with the
/// reader moved in and back out.
pub struct SerialTransport {
    reader: Option<BufReader<Box<dyn SerialPort>>>,
    writer: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening serial link on {} at {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(SERIAL_TIMEOUT)
            .open()?;
        let writer = port.try_clone()?;

        Ok(Self {
            reader: Some(BufReader::new(port)),
            writer,
        })
    }
}

// Keep reading through port timeouts until a full line (or EOF) arrives
fn read_serial_line(reader: &mut BufReader<Box<dyn SerialPort>>) -> Result<Option<String>> {
    let mut line = String::new();
    loop {
        match reader.read_line(&mut line) {
            Ok(0) if line.is_empty() => return Ok(None),
            Ok(_) if line.ends_with('\n') => return Ok(Some(strip_terminator(&line))),
            Ok(0) => return Ok(Some(strip_terminator(&line))),
            Ok(_) => continue,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

impl LineTransport for SerialTransport {
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut reader = self.reader.take().ok_or(TransportError::Closed)?;
        let (reader, line) = tokio::task::spawn_blocking(move || {
            let line = read_serial_line(&mut reader);
            (reader, line)
        })
        .await
        .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;

        self.reader = Some(reader);
        line
    }

    async fn write_frame(&mut self, frame: &str) -> Result<()> {
        self.writer.write_all(frame.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Zenoh pub/sub link: commands on `<prefix>/<hub>/cmd`, acks on `<prefix>/<hub>/ack`
pub struct ZenohTransport {
    _session: zenoh::Session,
    subscriber: zenoh::pubsub::Subscriber<
        zenoh::handlers::FifoChannelHandler<zenoh::sample::Sample>,
    >,
    publisher: zenoh::pubsub::Publisher<'static>,
}

fn zenoh_error(e: zenoh::Error) -> TransportError {
    TransportError::Zenoh(e.to_string())
}

impl ZenohTransport {
    pub async fn open(prefix: &str, hub: &str) -> Result<Self> {
        let cmd_key = format!("{}/{}/cmd", prefix, hub);
        let ack_key = format!("{}/{}/ack", prefix, hub);

        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh::Config::default())
            .await
            .map_err(zenoh_error)?;
        let subscriber = session
            .declare_subscriber(cmd_key.clone())
            .await
            .map_err(zenoh_error)?;
        let publisher = session
            .declare_publisher(ack_key.clone())
            .await
            .map_err(zenoh_error)?;

        info!("Subscribed to: {}", cmd_key);
        info!("Publishing to: {}", ack_key);
        Ok(Self {
            _session: session,
            subscriber,
            publisher,
        })
    }
}

impl LineTransport for ZenohTransport {
    async fn read_line(&mut self) -> Result<Option<String>> {
        match self.subscriber.recv_async().await {
            Ok(sample) => {
                let payload = sample.payload().to_bytes();
                Ok(Some(strip_terminator(&String::from_utf8_lossy(&payload))))
            }
            Err(e) => {
                debug!("Command subscriber closed: {}", e);
                Ok(None)
            }
        }
    }

    async fn write_frame(&mut self, frame: &str) -> Result<()> {
        self.publisher
            .put(frame.to_string())
            .await
            .map_err(zenoh_error)
    }
}

/// In-memory transport replaying a fixed list of input lines
///
/// Everything written is kept for inspection. Once the lines run out the
/// stream either closes or, with [`ScriptedTransport::failing_with`], reports
/// a read error like a dropped link would.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    input: VecDeque<String>,
    written: Vec<String>,
    read_error: Option<ErrorKind>,
}

impl ScriptedTransport {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: lines.into_iter().map(Into::into).collect(),
            written: Vec::new(),
            read_error: None,
        }
    }

    /// Fail every read after the last line with `kind`
    pub fn failing_with(mut self, kind: ErrorKind) -> Self {
        self.read_error = Some(kind);
        self
    }

    pub fn written(&self) -> &[String] {
        &self.written
    }

    pub fn output(&self) -> String {
        self.written.concat()
    }
}

impl LineTransport for ScriptedTransport {
    async fn read_line(&mut self) -> Result<Option<String>> {
        match (self.input.pop_front(), self.read_error) {
            (Some(line), _) => Ok(Some(strip_terminator(&line))),
            (None, Some(kind)) => {
                Err(TransportError::Io(std::io::Error::new(kind, "link dropped")))
            }
            (None, None) => Ok(None),
        }
    }

    async fn write_frame(&mut self, frame: &str) -> Result<()> {
        self.written.push(frame.to_string());
        Ok(())
    }
}

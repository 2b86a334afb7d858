use super::*;

use async_ssh2_tokio::Config;
use async_ssh2_tokio::client::{AuthMethod, Client};
use russh::ChannelMsg;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::capabilities::NC_BASE_1_0;
use crate::xml;

/// End-of-message delimiter of NETCONF 1.0 framing.
pub const FRAME_END: &str = "]]>]]>";

const CLIENT_HELLO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
 <capabilities>
  <capability>urn:ietf:params:netconf:base:1.0</capability>
 </capabilities>
</hello>"#;

/// Connection parameters for the NETCONF session.
#[derive(Debug, Clone)]
pub struct NetconfOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: ConnectionSecurityOptions,
    pub connect_timeout: Duration,
    /// Upper bound on each rpc-reply.
    pub timeout: Duration,
}

/// Keepalive misses tolerated before the connection is dropped.
const KEEPALIVE_MAX: usize = 3;

impl NetconfOptions {
    /// SSH settings for a session that stays idle while the CLI stages run.
    ///
    /// There is no inactivity timeout; keepalives detect a dead peer and
    /// each RPC is bounded by `timeout` on its own.
    fn ssh_config(&self) -> Config {
        Config {
            preferred: self.security.preferred(),
            inactivity_timeout: None,
            keepalive_interval: Some((self.timeout / 3).max(Duration::from_secs(1))),
            keepalive_max: KEEPALIVE_MAX,
            ..Default::default()
        }
    }
}

/// Splits a byte stream on `]]>]]>`.
#[derive(Debug, Default)]
struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    fn next_frame(&mut self) -> Option<String> {
        let delimiter = FRAME_END.as_bytes();
        let end = self
            .buf
            .windows(delimiter.len())
            .position(|w| w == delimiter)?;
        let frame = String::from_utf8_lossy(&self.buf[..end]).trim().to_string();
        self.buf.drain(..end + delimiter.len());
        Some(frame)
    }

    fn pending(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

fn rpc_document(message_id: u64, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rpc message-id=\"{message_id}\" xmlns=\"{NC_BASE_1_0}\">\n{body}\n</rpc>"
    )
}

/// NETCONF 1.0 session over the `netconf` SSH subsystem.
pub struct NetconfSshSession {
    addr: String,
    _client: Client,
    sender: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    frames: FrameBuffer,
    capabilities: Vec<String>,
    session_id: Option<String>,
    message_id: u64,
    timeout: Duration,
    transcript: Transcript,
    closed: bool,
}

impl NetconfSshSession {
    /// Opens the subsystem and exchanges hellos.
    pub async fn connect(
        options: NetconfOptions,
        transcript: Transcript,
    ) -> Result<Self, VerifyError> {
        let addr = format!("{}@{}:{}", options.username, options.host, options.port);

        let config = options.ssh_config();

        let connect = Client::connect_with_config(
            (options.host.clone(), options.port),
            &options.username,
            AuthMethod::with_password(&options.password),
            options.security.server_check.clone(),
            config,
        );
        let client = match tokio::time::timeout(options.connect_timeout, connect).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(VerifyError::ConnectFailed {
                    addr,
                    reason: format!("no answer within {}s", options.connect_timeout.as_secs()),
                });
            }
        };
        debug!("{} SSH connection successful", addr);

        let mut channel = client.get_channel().await?;
        channel.request_subsystem(true, "netconf").await?;
        debug!("{} netconf subsystem request successful", addr);

        let (sender_to_server, mut receiver_from_session) = mpsc::channel::<Vec<u8>>(256);
        let (sender_to_session, receiver_from_server) = mpsc::channel::<Vec<u8>>(256);

        let io_task_addr = addr.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(data) = receiver_from_session.recv() => {
                        if let Err(e) = channel.data(data.as_slice()).await {
                            debug!("{} failed to send data to subsystem: {:?}", io_task_addr, e);
                            break;
                        }
                    },
                    Some(msg) = channel.wait() => {
                        match msg {
                            ChannelMsg::Data { ref data } => {
                                if sender_to_session.send(data.to_vec()).await.is_err() {
                                    debug!("{} session receiver dropped. Closing task.", io_task_addr);
                                    break;
                                }
                            }
                            ChannelMsg::Eof | ChannelMsg::Close => {
                                debug!("{} subsystem closed.", io_task_addr);
                                break;
                            }
                            _ => {}
                        }
                    },
                    else => break,
                }
            }
            debug!("{} netconf I/O task ended.", io_task_addr);
        });

        let mut session = Self {
            addr,
            _client: client,
            sender: sender_to_server,
            receiver: receiver_from_server,
            frames: FrameBuffer::default(),
            capabilities: Vec::new(),
            session_id: None,
            message_id: 0,
            timeout: options.timeout,
            transcript,
            closed: false,
        };
        session.exchange_hello().await?;
        Ok(session)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn exchange_hello(&mut self) -> Result<(), VerifyError> {
        let server_hello = self.read_frame().await?;
        self.transcript.record(TranscriptEvent::RpcReceived {
            document: server_hello.clone(),
        })?;
        let hello = xml::parse_hello(&server_hello)?;
        if !hello.capabilities.iter().any(|c| c == NC_BASE_1_0) {
            return Err(VerifyError::MissingCapability(NC_BASE_1_0.to_string()));
        }

        self.write_frame(CLIENT_HELLO).await?;
        debug!(
            "{} hello exchanged, session-id {:?}, {} capabilities",
            self.addr,
            hello.session_id,
            hello.capabilities.len()
        );
        self.capabilities = hello.capabilities;
        self.session_id = hello.session_id;
        Ok(())
    }

    async fn write_frame(&mut self, document: &str) -> Result<(), VerifyError> {
        self.transcript.record(TranscriptEvent::RpcSent {
            document: document.to_string(),
        })?;
        let mut bytes = document.as_bytes().to_vec();
        bytes.push(b'\n');
        bytes.extend_from_slice(FRAME_END.as_bytes());
        bytes.push(b'\n');
        self.sender
            .send(bytes)
            .await
            .map_err(|_| VerifyError::ChannelDisconnectError)
    }

    async fn read_frame(&mut self) -> Result<String, VerifyError> {
        let frames = &mut self.frames;
        let receiver = &mut self.receiver;
        let result: Result<Result<String, VerifyError>, _> =
            tokio::time::timeout(self.timeout, async {
                loop {
                    if let Some(frame) = frames.next_frame() {
                        return Ok(frame);
                    }
                    match receiver.recv().await {
                        Some(data) => {
                            trace!("{:?}", String::from_utf8_lossy(&data));
                            frames.push(&data);
                        }
                        None => return Err(VerifyError::ChannelDisconnectError),
                    }
                }
            })
            .await;

        match result {
            Ok(frame) => frame,
            Err(_) => Err(VerifyError::ExecTimeout(self.frames.pending())),
        }
    }

    /// Sends a complete rpc document and returns the checked reply.
    async fn exchange(&mut self, document: &str) -> Result<String, VerifyError> {
        self.write_frame(document).await?;
        let reply = self.read_frame().await?;
        self.transcript.record(TranscriptEvent::RpcReceived {
            document: reply.clone(),
        })?;
        xml::check_reply(&reply)?;
        Ok(reply)
    }

    async fn rpc(&mut self, body: &str) -> Result<String, VerifyError> {
        self.message_id += 1;
        let document = rpc_document(self.message_id, body);
        self.exchange(&document).await
    }
}

#[async_trait]
impl ModelSession for NetconfSshSession {
    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn get_config(&mut self, source: Datastore) -> Result<String, VerifyError> {
        let body = format!(
            "<get-config>\n <source>\n  <{}/>\n </source>\n</get-config>",
            source.as_str()
        );
        let reply = self.rpc(&body).await?;
        xml::data_document(&reply)
    }

    async fn edit_config(&mut self, request: &EditRequest) -> Result<(), VerifyError> {
        self.exchange(request.rpc()).await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), VerifyError> {
        self.rpc("<commit/>").await?;
        Ok(())
    }

    async fn discard_changes(&mut self) -> Result<(), VerifyError> {
        self.rpc("<discard-changes/>").await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), VerifyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.rpc("<close-session/>").await;
        debug!("{} netconf session closed", self.addr);
        result.map(|_| ())
    }
}

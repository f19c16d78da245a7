//! Shared fixtures for integration tests
//!
//! - [`MockNews`] / [`MockConnector`]: in-memory providers behind the
//!   session interface, for driving the pool and pipeline deterministically
//! - [`FakeServer`]: a small NNTP server on a local TCP port, for exercising
//!   the real client end to end

#![allow(dead_code)]

use async_trait::async_trait;
use nntp_courier::commands::{GroupInfo, GroupList, XoverEntries};
use nntp_courier::{
    Article, Ledger, NntpError, NntpSession, Pipeline, PipelineConfig, PoolConfig, ProviderConfig,
    ProviderPool, Result, SessionConnector,
};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Enable log output for a test run with `RUST_LOG=debug`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Article store and fault switches for one in-memory provider
#[derive(Default)]
pub struct MockNews {
    articles: Mutex<HashMap<String, Vec<u8>>>,
    rejected_parts: Mutex<HashSet<u32>>,
    transient_posts: AtomicU32,
    cancel_after: Mutex<Option<(u32, CancellationToken)>>,
    no_groups: AtomicBool,
    stat_refused: AtomicBool,
    pub posts: AtomicU32,
    pub heads: AtomicU32,
    pub bodies: AtomicU32,
    pub groups_joined: AtomicU32,
}

impl MockNews {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer posts of this part number with 441
    pub fn reject_part(&self, part: u32) {
        self.rejected_parts.lock().unwrap().insert(part);
    }

    /// Drop the connection on the next `n` posts
    pub fn fail_next_posts(&self, n: u32) {
        self.transient_posts.store(n, Ordering::SeqCst);
    }

    /// Cancel `token` once `posts` articles have been accepted
    pub fn cancel_after(&self, posts: u32, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((posts, token));
    }

    /// Answer every GROUP with 411
    pub fn drop_groups(&self) {
        self.no_groups.store(true, Ordering::SeqCst);
    }

    /// Answer every STAT with 500
    pub fn refuse_stat(&self) {
        self.stat_refused.store(true, Ordering::SeqCst);
    }

    pub fn insert(&self, message_id: &str, body: Vec<u8>) {
        self.articles.lock().unwrap().insert(message_id.to_string(), body);
    }

    pub fn remove(&self, message_id: &str) -> bool {
        self.articles.lock().unwrap().remove(message_id).is_some()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.articles.lock().unwrap().contains_key(message_id)
    }

    pub fn article_count(&self) -> usize {
        self.articles.lock().unwrap().len()
    }

    pub fn message_ids(&self) -> Vec<String> {
        self.articles.lock().unwrap().keys().cloned().collect()
    }

    pub fn post_count(&self) -> u32 {
        self.posts.load(Ordering::SeqCst)
    }

    /// Copy every article into `other`
    pub fn mirror_to(&self, other: &MockNews) {
        let articles = self.articles.lock().unwrap().clone();
        other.articles.lock().unwrap().extend(articles);
    }
}

pub struct MockSession {
    news: Arc<MockNews>,
    broken: bool,
}

#[async_trait]
impl NntpSession for MockSession {
    async fn join_group(&mut self, newsgroup: &str) -> Result<GroupInfo> {
        self.news.groups_joined.fetch_add(1, Ordering::SeqCst);
        if self.news.no_groups.load(Ordering::SeqCst) {
            return Err(NntpError::NoSuchGroup(newsgroup.to_string()));
        }
        Ok(GroupInfo {
            name: newsgroup.to_string(),
            count: 0,
            first: 0,
            last: 0,
        })
    }

    async fn fetch_header(&mut self, id: &str) -> Result<Vec<String>> {
        self.news.heads.fetch_add(1, Ordering::SeqCst);
        if self.news.contains(id) {
            Ok(vec![format!("Message-ID: {id}")])
        } else {
            Err(NntpError::NoSuchArticle(id.to_string()))
        }
    }

    async fn fetch_body(&mut self, id: &str) -> Result<Vec<u8>> {
        self.news.bodies.fetch_add(1, Ordering::SeqCst);
        self.news
            .articles
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| NntpError::NoSuchArticle(id.to_string()))
    }

    async fn fetch_article(&mut self, id: &str) -> Result<Article> {
        Err(NntpError::NoSuchArticle(id.to_string()))
    }

    async fn stat(&mut self, id: &str) -> Result<bool> {
        if self.news.stat_refused.load(Ordering::SeqCst) {
            return Err(NntpError::Protocol {
                code: 500,
                message: "What?".to_string(),
            });
        }
        Ok(self.news.contains(id))
    }

    async fn post(&mut self, article: &Article) -> Result<String> {
        let pending_failures = self.news.transient_posts.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.news
                .transient_posts
                .store(pending_failures - 1, Ordering::SeqCst);
            self.broken = true;
            return Err(NntpError::TransientIo("connection reset".to_string()));
        }
        if self.news.rejected_parts.lock().unwrap().contains(&article.part) {
            return Err(NntpError::PostRejected("441 posting failed".to_string()));
        }
        if self.news.contains(&article.message_id) {
            return Err(NntpError::PostRejected("441 duplicate".to_string()));
        }

        let mut body = Vec::new();
        for line in &article.body {
            body.extend_from_slice(line);
            body.push(b'\n');
        }
        self.news.insert(&article.message_id, body);
        let posted = self.news.posts.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some((after, token)) = self.news.cancel_after.lock().unwrap().as_ref()
            && posted >= *after
        {
            token.cancel();
        }
        Ok(article.message_id.clone())
    }

    async fn list_groups(&mut self, _filter: Option<&str>) -> Result<GroupList> {
        Ok(GroupList::new(Vec::new(), None))
    }

    async fn xover(&mut self, _start: u64, _end: u64) -> Result<XoverEntries> {
        Ok(XoverEntries::new(Vec::new()))
    }

    async fn quit(&mut self) -> Result<()> {
        self.broken = true;
        Ok(())
    }

    fn is_broken(&self) -> bool {
        self.broken
    }

    fn mark_broken(&mut self) {
        self.broken = true;
    }
}

/// Routes provider hosts to [`MockNews`] instances
///
/// Unknown hosts refuse the connection; hosts starting with `down` reject
/// authentication.
#[derive(Default)]
pub struct MockConnector {
    servers: HashMap<String, Arc<MockNews>>,
    pub connects: AtomicU32,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, host: &str, news: Arc<MockNews>) -> Self {
        self.servers.insert(host.to_string(), news);
        self
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(&self, provider: &Arc<ProviderConfig>) -> Result<Box<dyn NntpSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if provider.host.starts_with("down") {
            return Err(NntpError::AuthRejected(format!("481 {}", provider.host)));
        }
        let news = self
            .servers
            .get(&provider.host)
            .cloned()
            .ok_or_else(|| NntpError::TransientIo(format!("{} refused", provider.host)))?;
        Ok(Box::new(MockSession {
            news,
            broken: false,
        }))
    }
}

pub fn provider(host: &str, priority: u32, max_connections: u32) -> ProviderConfig {
    ProviderConfig::plain(host)
        .with_name(host)
        .with_priority(priority)
        .with_max_connections(max_connections)
}

pub fn pool_config() -> PoolConfig {
    let mut config = PoolConfig::default();
    config.acquire_timeout_ms = 2_000;
    config.cooldown.jitter = false;
    config
}

pub fn pipeline_config(stage_root: &Path) -> PipelineConfig {
    PipelineConfig {
        part_size: 512,
        stage_root: stage_root.to_path_buf(),
        message_id_domain: "test.example".to_string(),
        ..PipelineConfig::default()
    }
}

pub async fn pipeline(
    providers: Vec<ProviderConfig>,
    connector: MockConnector,
    config: PipelineConfig,
) -> Pipeline {
    let pool = ProviderPool::new(providers, pool_config(), Arc::new(connector)).unwrap();
    let ledger = Ledger::open_in_memory().await.unwrap();
    Pipeline::new(pool, ledger, config).unwrap()
}

/// Deterministic pseudo-random bytes
pub fn sample_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 256) as u8).collect()
}

pub fn groups() -> Vec<String> {
    vec!["alt.binaries.test".to_string()]
}

/// Behaviour knobs for [`FakeServer`]
#[derive(Clone)]
pub struct FakeServerOptions {
    pub greeting: String,
    pub credentials: Option<(String, String)>,
    pub compression: bool,
}

impl Default for FakeServerOptions {
    fn default() -> Self {
        Self {
            greeting: "200 fake news server ready".to_string(),
            credentials: None,
            compression: false,
        }
    }
}

/// NNTP server on 127.0.0.1 speaking just enough of RFC 3977 for the
/// client: AUTHINFO, XFEATURE, GROUP, LIST ACTIVE, STAT, HEAD, BODY,
/// POST and QUIT
pub struct FakeServer {
    pub addr: SocketAddr,
    pub articles: Arc<Mutex<HashMap<String, Vec<Vec<u8>>>>>,
    pub commands: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    pub async fn start(options: FakeServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let articles: Arc<Mutex<HashMap<String, Vec<Vec<u8>>>>> = Arc::default();
        let commands: Arc<Mutex<Vec<String>>> = Arc::default();

        let (a, c) = (articles.clone(), commands.clone());
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let (a, c, o) = (a.clone(), c.clone(), options.clone());
                tokio::spawn(async move {
                    let _ = serve(socket, a, c, o).await;
                });
            }
        });

        Self {
            addr,
            articles,
            commands,
        }
    }

    /// Plain provider pointing at this server
    pub fn provider(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new("127.0.0.1", self.addr.port(), false);
        config.connect_timeout_secs = 5;
        config.command_timeout_secs = 5;
        config
    }

    pub fn command_log(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn article_count(&self) -> usize {
        self.articles.lock().unwrap().len()
    }
}

async fn serve(
    socket: tokio::net::TcpStream,
    articles: Arc<Mutex<HashMap<String, Vec<Vec<u8>>>>>,
    commands: Arc<Mutex<Vec<String>>>,
    options: FakeServerOptions,
) -> std::io::Result<()> {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    write
        .write_all(format!("{}\r\n", options.greeting).as_bytes())
        .await?;

    let mut user = None;
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&line).trim_end().to_string();
        commands.lock().unwrap().push(text.clone());
        let (verb, arg) = text.split_once(' ').unwrap_or((text.as_str(), ""));

        let reply: Vec<u8> = match verb.to_ascii_uppercase().as_str() {
            "AUTHINFO" => match arg.split_once(' ') {
                Some(("USER", name)) => {
                    user = Some(name.to_string());
                    b"381 password required\r\n".to_vec()
                }
                Some(("PASS", pass)) => {
                    let accepted = match &options.credentials {
                        Some((u, p)) => user.as_deref() == Some(u.as_str()) && pass == p,
                        None => true,
                    };
                    if accepted {
                        b"281 authentication accepted\r\n".to_vec()
                    } else {
                        b"481 authentication rejected\r\n".to_vec()
                    }
                }
                _ => b"501 syntax error\r\n".to_vec(),
            },
            "XFEATURE" if options.compression => b"290 feature enabled\r\n".to_vec(),
            "GROUP" if arg.starts_with("alt.") => {
                let count = articles.lock().unwrap().len();
                format!("211 {count} 1 {count} {arg}\r\n").into_bytes()
            }
            "GROUP" => b"411 no such newsgroup\r\n".to_vec(),
            "LIST" => b"215 list follows\r\nalt.binaries.test 10 1 y\r\nalt.test 5 1 y\r\ncomp.lang.rust 3 1 n\r\n.\r\n".to_vec(),
            "STAT" => {
                if articles.lock().unwrap().contains_key(arg) {
                    format!("223 0 {arg}\r\n").into_bytes()
                } else {
                    b"430 no such article\r\n".to_vec()
                }
            }
            "HEAD" => {
                if articles.lock().unwrap().contains_key(arg) {
                    format!("221 0 {arg}\r\nMessage-ID: {arg}\r\n.\r\n").into_bytes()
                } else {
                    b"430 no such article\r\n".to_vec()
                }
            }
            "BODY" => match articles.lock().unwrap().get(arg) {
                Some(body) => {
                    let mut out = format!("222 0 {arg}\r\n").into_bytes();
                    for line in body {
                        if line.first() == Some(&b'.') {
                            out.push(b'.');
                        }
                        out.extend_from_slice(line);
                        out.extend_from_slice(b"\r\n");
                    }
                    out.extend_from_slice(b".\r\n");
                    out
                }
                None => b"430 no such article\r\n".to_vec(),
            },
            "POST" => {
                write.write_all(b"340 send article\r\n").await?;
                let (message_id, body) = read_article(&mut reader).await?;
                let mut store = articles.lock().unwrap();
                match message_id {
                    Some(id) if !store.contains_key(&id) => {
                        store.insert(id, body);
                        b"240 article posted\r\n".to_vec()
                    }
                    _ => b"441 posting failed\r\n".to_vec(),
                }
            }
            "QUIT" => {
                write.write_all(b"205 bye\r\n").await?;
                return Ok(());
            }
            _ => b"500 unknown command\r\n".to_vec(),
        };
        write.write_all(&reply).await?;
    }
}

/// Read a dot-terminated article, returning its Message-ID and unstuffed
/// body lines
async fn read_article<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<(Option<String>, Vec<Vec<u8>>)> {
    let mut message_id = None;
    let mut body = Vec::new();
    let mut in_body = false;
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let content = line
            .strip_suffix(b"\n")
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
            .unwrap_or(&line);
        if content == b"." {
            break;
        }
        if in_body {
            let content = content.strip_prefix(b".").filter(|_| content.starts_with(b"..")).unwrap_or(content);
            body.push(content.to_vec());
        } else if content.is_empty() {
            in_body = true;
        } else if let Some(value) = String::from_utf8_lossy(content).strip_prefix("Message-ID: ") {
            message_id = Some(value.trim().to_string());
        }
    }
    Ok((message_id, body))
}

/// Wait briefly for background work to settle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::Mutex;

const MAX_LOG_LINES: usize = 200;

#[derive(Debug, Clone, Copy)]
pub enum Kind {
    Info,
    Search,
    Http,
    Llm,
    Agent,
    Data,
    Chart,
}

impl Kind {
    fn tag(&self) -> &'static str {
        match self {
            Kind::Info => "CI",
            Kind::Search => "Search",
            Kind::Http => "HTTP",
            Kind::Llm => "LLM",
            Kind::Agent => "Agent",
            Kind::Data => "Data",
            Kind::Chart => "Chart",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub text: String,
    pub kind: Kind,
}

static RUN_LOG: Lazy<Mutex<VecDeque<Entry>>> = Lazy::new(|| Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES)));

pub fn log<T: Into<String>>(line: T) {
    log_with(Kind::Info, line);
}

pub fn log_with<T: Into<String>>(kind: Kind, line: T) {
    if let Ok(mut buf) = RUN_LOG.lock() {
        let s = line.into();
        if buf.len() >= MAX_LOG_LINES { buf.pop_front(); }
        buf.push_back(Entry { text: s, kind });
    }
}

#[allow(dead_code)]
pub fn recent(n: usize) -> Vec<Entry> {
    if let Ok(buf) = RUN_LOG.lock() {
        let len = buf.len();
        let take = n.min(len);
        buf.iter().skip(len - take).cloned().collect()
    } else {
        Vec::new()
    }
}

/// Renders the whole buffer, oldest first, for the response `log` field.
pub fn snapshot() -> String {
    if let Ok(buf) = RUN_LOG.lock() {
        buf.iter()
            .map(|e| format!("[{}] {}", e.kind.tag(), e.text))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        String::new()
    }
}

pub fn clear() {
    if let Ok(mut buf) = RUN_LOG.lock() {
        buf.clear();
    }
}

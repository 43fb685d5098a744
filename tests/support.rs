#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use serde_json::Value;

use mcp_hub_lib::{
    AppError, AppState, AppType, ClaudeMcpStore, CodexMcpStore, Database, GeminiMcpStore,
    LiveStores, McpLiveStore, McpServerSpec,
};

/// 全局互斥锁，避免多测试并发修改进程级环境变量。
pub fn test_mutex() -> &'static Mutex<()> {
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX.get_or_init(|| Mutex::new(()))
}

/// In-memory live store with switchable failure injection
pub struct FakeStore {
    app: AppType,
    entries: Mutex<BTreeMap<String, McpServerSpec>>,
    fail: AtomicBool,
    writes: AtomicUsize,
}

impl FakeStore {
    pub fn new(app: AppType) -> Arc<Self> {
        Arc::new(Self {
            app,
            entries: Mutex::new(BTreeMap::new()),
            fail: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().expect("lock entries").contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<McpServerSpec> {
        self.entries.lock().expect("lock entries").get(id).cloned()
    }

    pub fn insert_raw(&self, id: &str, spec: McpServerSpec) {
        self.entries
            .lock()
            .expect("lock entries")
            .insert(id.to_string(), spec);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Message(format!("{} 配置文件不可写", self.app)));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl McpLiveStore for FakeStore {
    fn app(&self) -> AppType {
        self.app
    }

    fn materialize(&self, id: &str, server: &McpServerSpec) -> Result<(), AppError> {
        self.check()?;
        self.insert_raw(id, server.clone());
        Ok(())
    }

    fn retract(&self, id: &str) -> Result<(), AppError> {
        self.check()?;
        self.entries.lock().expect("lock entries").remove(id);
        Ok(())
    }

    fn read_servers(&self) -> Result<BTreeMap<String, Value>, AppError> {
        Ok(self
            .entries
            .lock()
            .expect("lock entries")
            .iter()
            .map(|(id, spec)| (id.clone(), spec.to_value()))
            .collect())
    }

    fn replace_all(&self, servers: &BTreeMap<String, McpServerSpec>) -> Result<(), AppError> {
        self.check()?;
        *self.entries.lock().expect("lock entries") = servers.clone();
        Ok(())
    }
}

pub struct FakeStores {
    pub claude: Arc<FakeStore>,
    pub codex: Arc<FakeStore>,
    pub gemini: Arc<FakeStore>,
}

impl FakeStores {
    pub fn get(&self, app: AppType) -> &Arc<FakeStore> {
        match app {
            AppType::Claude => &self.claude,
            AppType::Codex => &self.codex,
            AppType::Gemini => &self.gemini,
        }
    }
}

/// 创建测试用的 AppState：内存数据库 + 内存中的各应用存储
pub fn create_fake_state() -> (AppState, FakeStores) {
    let stores = FakeStores {
        claude: FakeStore::new(AppType::Claude),
        codex: FakeStore::new(AppType::Codex),
        gemini: FakeStore::new(AppType::Gemini),
    };
    let live = LiveStores::new(vec![
        stores.claude.clone() as Arc<dyn McpLiveStore>,
        stores.codex.clone() as Arc<dyn McpLiveStore>,
        stores.gemini.clone() as Arc<dyn McpLiveStore>,
    ]);
    let db = Database::memory().expect("create memory database");
    (AppState::new(Arc::new(db), live), stores)
}

/// 创建测试用的 AppState：数据库与各应用配置文件都位于 `dir` 下
pub fn create_file_state(dir: &Path) -> AppState {
    let stores: Vec<Arc<dyn McpLiveStore>> = vec![
        Arc::new(ClaudeMcpStore::new(dir.join(".claude.json"))),
        Arc::new(CodexMcpStore::new(dir.join(".codex").join("config.toml"))),
        Arc::new(GeminiMcpStore::new(dir.join(".gemini").join("settings.json"))),
    ];
    let live = LiveStores::new(stores);
    let db = Database::open(&dir.join("mcp-hub.db")).expect("open database");
    AppState::new(Arc::new(db), live)
}

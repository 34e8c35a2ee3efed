//! Scripted bulk tool runner shared by the coordinator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use docferry_core::Result;
use docferry_core::profile::{BackendKind, ConnectionProfile, ConnectionProfileBuilder};
use docferry_core::tools::{BulkTool, ToolInvocation, ToolOutput, ToolRunner};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Password used by every test profile; must never show up in logs or reasons.
pub const SECRET: &str = "p@ss:1#";

pub fn source_profile() -> ConnectionProfile {
    ConnectionProfileBuilder::new(BackendKind::NativeDocument)
        .host("source.example.com")
        .database("admin")
        .username("migrator")
        .password(SECRET)
        .build()
        .unwrap()
}

pub fn target_profile() -> ConnectionProfile {
    ConnectionProfileBuilder::new(BackendKind::CompatibilityLayer)
        .host("adb.example.com")
        .database("REG")
        .username("REG")
        .password(SECRET)
        .build()
        .unwrap()
}

pub fn success_output(restored: u64, failed: u64) -> ToolOutput {
    ToolOutput {
        exit_code: Some(0),
        stdout: String::new(),
        stderr: format!(
            "2024-05-01T10:00:00.000+0000\t{} document(s) restored successfully. {} document(s) failed to restore.\n",
            restored, failed
        ),
    }
}

pub fn failure_output(code: i32, stderr: &str) -> ToolOutput {
    ToolOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Writes an artifact pair the way the export tool lays it out.
pub fn write_artifact(root: &Path, database: &str, collection: &str, data: &[u8], metadata: bool) {
    let dir = root.join(database);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{}.bson", collection)), data).unwrap();
    if metadata {
        std::fs::write(
            dir.join(format!("{}.metadata.json", collection)),
            br#"{"indexes":[{"v":2,"key":{"_id":1},"name":"_id_"}]}"#,
        )
        .unwrap();
    }
}

/// Records every invocation and answers from a script.
///
/// Export calls write `<out>/<db>/<collection>.bson[.gz]` (plus metadata) for
/// the configured collections. Import calls answer per target collection.
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<ToolInvocation>>,
    export_collections: Vec<(String, bool)>,
    export_failure: Option<ToolOutput>,
    import_results: HashMap<String, ToolOutput>,
    delay: Option<Duration>,
    active: Mutex<HashMap<String, usize>>,
    max_active_per_namespace: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collections the export tool "dumps", with or without metadata.
    pub fn exporting(mut self, collections: &[(&str, bool)]) -> Self {
        self.export_collections = collections
            .iter()
            .map(|(name, metadata)| ((*name).to_string(), *metadata))
            .collect();
        self
    }

    pub fn failing_export(mut self, output: ToolOutput) -> Self {
        self.export_failure = Some(output);
        self
    }

    pub fn import_result(mut self, collection: &str, output: ToolOutput) -> Self {
        self.import_results.insert(collection.to_string(), output);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, tool: BulkTool) -> Vec<ToolInvocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.tool() == tool)
            .collect()
    }

    pub fn max_active_per_namespace(&self) -> usize {
        self.max_active_per_namespace.load(Ordering::SeqCst)
    }

    fn run_export(&self, invocation: &ToolInvocation) -> ToolOutput {
        if let Some(failure) = &self.export_failure {
            return failure.clone();
        }

        let out = Path::new(invocation.flag_value("out").unwrap());
        let database = invocation.flag_value("db").unwrap();
        let named = invocation.flag_value("collection");
        let gzip = invocation.has_flag("gzip");

        let dir = out.join(database);
        std::fs::create_dir_all(&dir).unwrap();
        for (collection, metadata) in &self.export_collections {
            if named.is_some_and(|n| n != collection) {
                continue;
            }
            let (data_ext, meta_ext) = if gzip {
                ("bson.gz", "metadata.json.gz")
            } else {
                ("bson", "metadata.json")
            };
            std::fs::write(dir.join(format!("{}.{}", collection, data_ext)), b"\x05\0\0\0\0").unwrap();
            if *metadata {
                std::fs::write(dir.join(format!("{}.{}", collection, meta_ext)), b"{}").unwrap();
            }
        }

        ToolOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: "done dumping".to_string(),
        }
    }

    async fn run_import(&self, invocation: &ToolInvocation) -> ToolOutput {
        let database = invocation.flag_value("db").unwrap_or_default().to_string();
        let collection = invocation.flag_value("collection").unwrap_or_default().to_string();
        let namespace = format!("{}.{}", database, collection);

        {
            let mut active = self.active.lock().unwrap();
            let count = active.entry(namespace.clone()).or_insert(0);
            *count += 1;
            self.max_active_per_namespace.fetch_max(*count, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut active = self.active.lock().unwrap();
            if let Some(count) = active.get_mut(&namespace) {
                *count -= 1;
            }
        }

        self.import_results
            .get(&collection)
            .cloned()
            .unwrap_or_else(|| success_output(0, 0))
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        match invocation.tool() {
            BulkTool::Export => Ok(self.run_export(invocation)),
            BulkTool::Import => Ok(self.run_import(invocation).await),
        }
    }
}

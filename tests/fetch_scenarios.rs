use std::{cell::RefCell, fs, path::Path, rc::Rc};

use anyhow::{anyhow, Result};
use serde_json::json;
use tempfile::TempDir;
use vocal_resources::{
    models::{Artifacts, FetchError, FetchRequest, ResourceManager, SourceStrategy, Strategies},
    CatalogSource, Environment, Node, StoreError,
};

struct Offline;

impl CatalogSource for Offline {
    fn fetch_catalog(&self) -> Result<Vec<u8>> {
        Err(anyhow!("offline"))
    }
}

/// Pretends to download one file named after the link's last segment.
#[derive(Clone, Default)]
struct Recorder {
    calls: Rc<RefCell<Vec<String>>>,
}

impl SourceStrategy for Recorder {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Artifacts> {
        self.calls.borrow_mut().push(request.link.to_string());
        if request.link.contains("broken") {
            return Err(anyhow!("connection reset"));
        }
        let file = request.link.rsplit('/').next().unwrap_or("file").to_string();
        let path = request.destination.join(format!("{file}.pth"));
        Ok(Artifacts::from([(format!("{file}.pth"), path)]))
    }
}

struct Fixture {
    _dir: TempDir,
    env: Environment,
    direct: Recorder,
    cloud: Recorder,
    hub: Recorder,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let catalog = json!({
            "so-vits": {
                "models": {
                    "foo": {"link": ["https://huggingface.co/org/repo"], "auth": {}},
                    "nyaru": {"link": ["https://cowtransfer.com/s/nyaru"], "auth": {}, "private": true},
                    "mirror": {"link": "ftp://mirror.example/model.zip", "auth": {}},
                    "flaky": {"link": ["https://huggingface.co/org/broken"], "auth": {}}
                },
                "datasets": {
                    "choir": {"link": ["https://huggingface.co/org/choir"], "auth": {}}
                }
            },
            "demucs": {
                "models": {
                    "htdemucs": {
                        "link": [
                            "https://dl.example/demucs/955717e8",
                            "https://dl.example/demucs/f7e0c4bc"
                        ],
                        "auth": {}
                    },
                    "partial": {
                        "link": ["https://dl.example/demucs/a", "https://dl.example/demucs/broken"],
                        "auth": {}
                    }
                }
            },
            "unknown-engine": {"models": {"x": {"link": ["https://x"], "auth": {}}}}
        });
        write_json(&dir.path().join("files/sources.json"), &catalog);
        write_json(
            &dir.path().join("environment.json"),
            &json!({
                "model": {"demucs": "files/models/demucs", "so-vits": "files/models/so-vits"},
                "preset": {"demucs": "files/presets/demucs", "so-vits": "files/presets/so-vits"},
                "dataset": {"demucs": "files/datasets/demucs", "so-vits": "files/datasets/so-vits"},
                "output": "files/output",
                "sources": "files/sources.json",
                "sources_export": "files/sources_export.json",
                "key_path": "files/keys",
                "keys": {}
            }),
        );
        let env = Environment::bootstrap(dir.path().join("environment.json"), &Offline).unwrap();
        Self {
            _dir: dir,
            env,
            direct: Recorder::default(),
            cloud: Recorder::default(),
            hub: Recorder::default(),
        }
    }

    fn manager(&mut self) -> ResourceManager<'_> {
        let strategies = Strategies::new(self.direct.clone(), self.cloud.clone(), self.hub.clone());
        ResourceManager::with_strategies(&mut self.env, strategies)
    }

    fn calls(recorder: &Recorder) -> Vec<String> {
        recorder.calls.borrow().clone()
    }
}

fn write_json(path: &Path, value: &serde_json::Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

#[test]
fn hub_link_is_fetched_and_recorded_under_local() {
    let mut fixture = Fixture::new();
    let artifacts = fixture.manager().fetch("so-vits", "models", "foo", false).unwrap();

    assert_eq!(Fixture::calls(&fixture.hub), ["https://huggingface.co/org/repo"]);
    assert!(Fixture::calls(&fixture.cloud).is_empty());
    let expected = fixture.env.model_dir("so-vits").unwrap().join("foo/repo.pth");
    assert_eq!(artifacts["repo.pth"], expected);

    let local = fixture
        .env
        .sources()
        .node("so-vits.models.foo.local")
        .expect("local paths recorded");
    assert_eq!(
        local.entry_value("repo.pth").and_then(|v| v.as_str()).map(str::to_string),
        Some(expected.to_string_lossy().into_owned())
    );
    // the rest of the catalog is untouched
    assert!(fixture.env.sources().contains("so-vits.models.foo.link"));
    assert!(fixture.env.sources().contains("so-vits.models.nyaru"));
    assert!(fixture.env.sources().contains("demucs.models.htdemucs"));
}

#[test]
fn cloud_transfer_link_dispatches_to_cloud_strategy() {
    let mut fixture = Fixture::new();
    fixture.manager().fetch("so-vits", "models", "nyaru", true).unwrap();
    assert_eq!(Fixture::calls(&fixture.cloud), ["https://cowtransfer.com/s/nyaru"]);
    assert!(Fixture::calls(&fixture.hub).is_empty());
}

#[test]
fn demucs_fetches_every_link_directly() {
    let mut fixture = Fixture::new();
    let artifacts = fixture
        .manager()
        .fetch("demucs", "models", "htdemucs", false)
        .unwrap();
    assert_eq!(Fixture::calls(&fixture.direct).len(), 2);
    assert_eq!(
        artifacts.keys().collect::<Vec<_>>(),
        ["955717e8.pth", "f7e0c4bc.pth"]
    );
    assert_eq!(
        fixture
            .env
            .sources()
            .node("demucs.models.htdemucs.local")
            .map(Node::len),
        Some(2)
    );
}

#[test]
fn unknown_engine_is_skipped() {
    let mut fixture = Fixture::new();
    let artifacts = fixture
        .manager()
        .fetch("unknown-engine", "models", "x", false)
        .unwrap();
    assert!(artifacts.is_empty());
    assert!(Fixture::calls(&fixture.direct).is_empty());
    assert!(!fixture.env.sources().contains("unknown-engine.models.x.local"));
}

#[test]
fn unknown_source_scheme_is_skipped() {
    let mut fixture = Fixture::new();
    let artifacts = fixture
        .manager()
        .fetch("so-vits", "models", "mirror", false)
        .unwrap();
    assert!(artifacts.is_empty());
    assert!(!fixture.env.sources().contains("so-vits.models.mirror.local"));
}

#[test]
fn missing_catalog_entry_is_key_not_found() {
    let mut fixture = Fixture::new();
    let error = fixture
        .manager()
        .fetch("so-vits", "models", "missing", false)
        .unwrap_err();
    assert!(matches!(
        error,
        FetchError::Store(StoreError::KeyNotFound { ref resolved, .. }) if resolved == "so-vits.models"
    ));
}

#[test]
fn transfer_failures_carry_the_link() {
    let mut fixture = Fixture::new();
    let error = fixture
        .manager()
        .fetch("so-vits", "models", "flaky", false)
        .unwrap_err();
    assert!(matches!(
        error,
        FetchError::Transfer { ref link, .. } if link == "https://huggingface.co/org/broken"
    ));
}

#[test]
fn finished_links_stay_recorded_when_a_later_link_fails() {
    let mut fixture = Fixture::new();
    let error = fixture
        .manager()
        .fetch("demucs", "models", "partial", false)
        .unwrap_err();
    assert!(matches!(
        error,
        FetchError::Transfer { ref link, .. } if link == "https://dl.example/demucs/broken"
    ));

    let local = fixture
        .env
        .sources()
        .node("demucs.models.partial.local")
        .expect("finished link recorded");
    assert_eq!(local.keys().collect::<Vec<_>>(), ["a.pth"]);
}

#[test]
fn datasets_land_in_the_dataset_directory() {
    let mut fixture = Fixture::new();
    let artifacts = fixture
        .manager()
        .fetch("so-vits", "datasets", "choir", false)
        .unwrap();
    let expected = fixture.env.dataset_dir("so-vits").unwrap().join("choir/choir.pth");
    assert_eq!(artifacts["choir.pth"], expected);
}

#[test]
fn fetch_all_isolates_failures() {
    let mut fixture = Fixture::new();
    let report = fixture.manager().fetch_all("so-vits", "models", false).unwrap();

    assert_eq!(
        report.fetched.keys().collect::<Vec<_>>(),
        ["foo", "mirror", "nyaru"]
    );
    assert_eq!(report.failed.keys().collect::<Vec<_>>(), ["flaky"]);
    assert!(report.fetched["mirror"].is_empty());
    assert!(fixture.env.sources().contains("so-vits.models.foo.local"));
}

#[test]
fn list_available_names_resources() {
    let mut fixture = Fixture::new();
    let manager = fixture.manager();
    assert_eq!(
        manager.list_available("so-vits", "models").unwrap(),
        ["foo", "nyaru", "mirror", "flaky"]
    );
    assert!(matches!(
        manager.list_available("rvc", "models"),
        Err(StoreError::KeyNotFound { .. })
    ));
}

#[test]
fn export_after_fetch_hides_private_and_local_paths() {
    let mut fixture = Fixture::new();
    fixture.manager().fetch("so-vits", "models", "foo", false).unwrap();
    fixture.env.save_sources().unwrap();

    let exported = fixture.env.export_sources(false).unwrap();
    assert!(!exported.contains("so-vits.models.nyaru"));
    assert_eq!(
        exported.node("so-vits.models.foo.local").map(Node::is_empty),
        Some(true)
    );

    let saved = Node::from_path(fixture.env.sources_path().unwrap()).unwrap();
    assert_eq!(saved.node("so-vits.models.foo.local").map(Node::len), Some(1));
}

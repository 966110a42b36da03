use std::collections::BTreeMap;

use tracing::{info, warn};

use super::{
    cloud::CloudTransfer,
    direct::DirectLink,
    download::Artifacts,
    hub::HubSnapshot,
    sources::{Engine, FetchError, FetchRequest, SourceKind, SourceStrategy},
};
use crate::{
    core::environment::Environment,
    store::{Node, StoreError, Value, LOCAL_KEY},
};

pub struct Strategies {
    direct: Box<dyn SourceStrategy>,
    cloud_transfer: Box<dyn SourceStrategy>,
    hub: Box<dyn SourceStrategy>,
}

impl Strategies {
    pub fn new(
        direct: impl SourceStrategy + 'static,
        cloud_transfer: impl SourceStrategy + 'static,
        hub: impl SourceStrategy + 'static,
    ) -> Self {
        Self {
            direct: Box::new(direct),
            cloud_transfer: Box::new(cloud_transfer),
            hub: Box::new(hub),
        }
    }

    fn for_kind(&self, kind: SourceKind) -> &dyn SourceStrategy {
        match kind {
            SourceKind::DirectLink => self.direct.as_ref(),
            SourceKind::CloudTransfer => self.cloud_transfer.as_ref(),
            SourceKind::HubSnapshot => self.hub.as_ref(),
        }
    }
}

impl Default for Strategies {
    fn default() -> Self {
        Self::new(DirectLink, CloudTransfer::default(), HubSnapshot::default())
    }
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub fetched: BTreeMap<String, Artifacts>,
    pub failed: BTreeMap<String, FetchError>,
}

/// Fetches catalog resources and records where they landed under the
/// entry's `local` node. Persisting the catalog is left to the caller.
pub struct ResourceManager<'env> {
    env: &'env mut Environment,
    strategies: Strategies,
}

impl<'env> ResourceManager<'env> {
    pub fn new(env: &'env mut Environment) -> Self {
        Self::with_strategies(env, Strategies::default())
    }

    pub fn with_strategies(env: &'env mut Environment, strategies: Strategies) -> Self {
        Self { env, strategies }
    }

    pub fn environment(&self) -> &Environment {
        self.env
    }

    /// Names available under `engine.kind` in the catalog.
    pub fn list_available(&self, engine: &str, kind: &str) -> Result<Vec<String>, StoreError> {
        let path = format!("{engine}.{kind}");
        let value = self.env.sources().get_strict(&path)?;
        let resources = value.as_node().ok_or_else(|| StoreError::TypeMismatch {
            path,
            expected: "node",
            found: value.type_name(),
        })?;
        Ok(resources.keys().map(str::to_string).collect())
    }

    /// Fetches every link of `engine.kind.name`.
    ///
    /// Engines other than `demucs` and `so-vits` are skipped with an empty
    /// result, as are links no strategy understands.
    pub fn fetch(
        &mut self,
        engine: &str,
        kind: &str,
        name: &str,
        refresh: bool,
    ) -> Result<Artifacts, FetchError> {
        let engine = match engine.parse::<Engine>() {
            Ok(engine) => engine,
            Err(error) => {
                warn!("{error}, skipping");
                return Ok(Artifacts::new());
            }
        };

        let entry_path = format!("{engine}.{kind}.{name}");
        let entry = match self.env.sources().get_strict(&entry_path)? {
            Value::Node(entry) => entry.clone(),
            other => {
                return Err(StoreError::TypeMismatch {
                    path: entry_path,
                    expected: "node",
                    found: other.type_name(),
                }
                .into())
            }
        };
        let links = links_of(&entry, &entry_path)?;
        let auth = entry.node("auth").cloned().unwrap_or_default();
        let checksum = entry.entry_value("sha256").and_then(Value::as_str);
        let destination = self.env.resource_dir(engine.as_str(), kind)?.join(name);

        let mut artifacts = Artifacts::new();
        let mut failure = None;
        for link in &links {
            let source_kind = match engine.source_for(link) {
                Ok(source_kind) => source_kind,
                Err(error) => {
                    warn!("{error}, skipping");
                    continue;
                }
            };
            let request = FetchRequest {
                engine,
                name,
                link,
                auth: &auth,
                checksum,
                destination: destination.clone(),
                refresh,
            };
            match self.strategies.for_kind(source_kind).fetch(&request) {
                Ok(fetched) => artifacts.extend(fetched),
                Err(source) => {
                    failure = Some(FetchError::Transfer {
                        link: link.clone(),
                        source,
                    });
                    break;
                }
            }
        }

        // files from links that already finished stay on record
        if !artifacts.is_empty() {
            self.record_local(&entry_path, &artifacts);
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(artifacts),
        }
    }

    /// Fetches every resource of `engine.kind`; one failing resource does not
    /// stop the others.
    pub fn fetch_all(
        &mut self,
        engine: &str,
        kind: &str,
        refresh: bool,
    ) -> Result<FetchReport, FetchError> {
        let mut report = FetchReport::default();
        for name in self.list_available(engine, kind)? {
            match self.fetch(engine, kind, &name, refresh) {
                Ok(artifacts) => {
                    report.fetched.insert(name, artifacts);
                }
                Err(error) => {
                    warn!("failed to fetch {engine}.{kind}.{name}: {error:?}");
                    report.failed.insert(name, error);
                }
            }
        }
        info!(
            "fetched {} of {} {engine} {kind}",
            report.fetched.len(),
            report.fetched.len() + report.failed.len()
        );
        Ok(report)
    }

    fn record_local(&mut self, entry_path: &str, artifacts: &Artifacts) {
        let mut local = Node::new();
        for (artifact, path) in artifacts {
            local.insert(artifact.as_str(), path.as_path());
        }
        self.env
            .sources_mut()
            .set(&format!("{entry_path}.{LOCAL_KEY}"), local);
    }
}

fn links_of(entry: &Node, entry_path: &str) -> Result<Vec<String>, StoreError> {
    let path = format!("{entry_path}.link");
    match entry.entry_value("link") {
        Some(Value::String(link)) => Ok(vec![link.clone()]),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| StoreError::TypeMismatch {
                        path: path.clone(),
                        expected: "string",
                        found: item.type_name(),
                    })
            })
            .collect(),
        Some(other) => Err(StoreError::TypeMismatch {
            path,
            expected: "sequence",
            found: other.type_name(),
        }),
        None => Err(StoreError::KeyNotFound {
            path,
            resolved: entry_path.to_string(),
        }),
    }
}

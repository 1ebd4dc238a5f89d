//! Sink settings store
//!
//! JSON persistence for per-sink stream settings: one file for the global
//! sink, one file per tenant under a directory. Implements
//! [`SinkConfigProvider`] for the relay and carries the administrative
//! mutations (set/clear destination, mode, throttle, chunk limit).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use contracts::{
    ChannelId, ContractError, LogLevel, SinkConfig, SinkConfigProvider, SinkId, StoreConfig,
    StreamMode, StreamSettings, TenantId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Persisted settings of one sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkRecord {
    /// Destination channel, `0` = none
    pub channel_id: ChannelId,

    /// Stream settings
    pub stream: StreamSettings,

    /// Queue log level; only read from the global record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
}

impl SinkRecord {
    /// Destination channel, if one is set
    pub fn destination(&self) -> Option<ChannelId> {
        (self.channel_id != 0).then_some(self.channel_id)
    }

    /// Relay view of this record
    pub fn to_config(&self) -> Option<SinkConfig> {
        self.destination()
            .map(|channel| SinkConfig::new(channel, self.stream))
    }
}

#[derive(Debug, Clone)]
enum Persistence {
    Memory,
    Disk {
        global_path: PathBuf,
        tenants_dir: PathBuf,
    },
}

#[derive(Debug, Default)]
struct StoreState {
    global: SinkRecord,
    tenants: BTreeMap<TenantId, SinkRecord>,
}

/// Store of sink settings
#[derive(Debug)]
pub struct SinkSettingsStore {
    persistence: Persistence,
    state: RwLock<StoreState>,
}

impl SinkSettingsStore {
    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            persistence: Persistence::Memory,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Open (and create if needed) the on-disk store
    ///
    /// # Errors
    /// - Directory creation failure
    /// - Unreadable global settings file
    #[instrument(name = "settings_store_open", skip(config), fields(tenants_dir = %config.tenants_dir.display()))]
    pub fn open(config: &StoreConfig) -> Result<Self, ContractError> {
        fs::create_dir_all(&config.tenants_dir)?;
        if let Some(parent) = config.global_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let persistence = Persistence::Disk {
            global_path: config.global_path.clone(),
            tenants_dir: config.tenants_dir.clone(),
        };
        let state = load_state(&config.global_path, &config.tenants_dir)?;
        info!(tenants = state.tenants.len(), "Sink settings loaded");

        Ok(Self {
            persistence,
            state: RwLock::new(state),
        })
    }

    /// Re-read every record from disk. No-op for in-memory stores.
    pub fn reload(&self) -> Result<(), ContractError> {
        let Persistence::Disk {
            global_path,
            tenants_dir,
        } = &self.persistence
        else {
            return Ok(());
        };
        let fresh = load_state(global_path, tenants_dir)?;
        *self.write()? = fresh;
        debug!("Sink settings reloaded");
        Ok(())
    }

    /// Current record of a sink (defaults if never configured)
    pub fn record(&self, sink: SinkId) -> Result<SinkRecord, ContractError> {
        let state = self.read()?;
        Ok(match sink {
            SinkId::Global => state.global,
            SinkId::Tenant(id) => state.tenants.get(&id).copied().unwrap_or_default(),
        })
    }

    /// Every known record, global first
    pub fn records(&self) -> Result<Vec<(SinkId, SinkRecord)>, ContractError> {
        let state = self.read()?;
        let mut out = Vec::with_capacity(state.tenants.len() + 1);
        out.push((SinkId::Global, state.global));
        out.extend(
            state
                .tenants
                .iter()
                .map(|(id, record)| (SinkId::Tenant(*id), *record)),
        );
        Ok(out)
    }

    /// Persisted queue log level, if one was set
    pub fn log_level(&self) -> Result<Option<LogLevel>, ContractError> {
        Ok(self.read()?.global.log_level)
    }

    /// Set the queue log level, kept in the global record
    pub fn set_log_level(&self, level: &str) -> Result<LogLevel, ContractError> {
        let level: LogLevel = level.parse()?;
        self.update(SinkId::Global, |record| record.log_level = Some(level))?;
        Ok(level)
    }

    /// Point a sink at a destination channel
    pub fn set_destination(&self, sink: SinkId, channel: ChannelId) -> Result<(), ContractError> {
        if channel == 0 {
            return Err(ContractError::config_validation(
                "channel_id",
                "channel id must be non-zero",
            ));
        }
        self.update(sink, |record| record.channel_id = channel)
    }

    /// Remove a sink's destination
    pub fn clear_destination(&self, sink: SinkId) -> Result<(), ContractError> {
        self.update(sink, |record| record.channel_id = 0)
    }

    /// Switch delivery mode; anything but `live` / `batch` is rejected
    pub fn set_mode(&self, sink: SinkId, mode: &str) -> Result<StreamMode, ContractError> {
        let mode: StreamMode = mode.parse()?;
        self.update(sink, |record| record.stream.mode = mode)?;
        Ok(mode)
    }

    /// Set live edit throttle, clamped to >= 0
    pub fn set_throttle(&self, sink: SinkId, ms: i64) -> Result<u64, ContractError> {
        let ms = StreamSettings::clamp_throttle(ms);
        self.update(sink, |record| record.stream.throttle_ms = ms)?;
        Ok(ms)
    }

    /// Set live chunk limit, clamped to >= the minimum
    pub fn set_chunk_limit(&self, sink: SinkId, n: i64) -> Result<usize, ContractError> {
        let n = StreamSettings::clamp_chunk_limit(n);
        self.update(sink, |record| record.stream.chunk_limit = n)?;
        Ok(n)
    }

    fn update<F>(&self, sink: SinkId, mutate: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut SinkRecord),
    {
        let mut state = self.write()?;
        let mut record = match sink {
            SinkId::Global => state.global,
            SinkId::Tenant(id) => state.tenants.get(&id).copied().unwrap_or_default(),
        };
        mutate(&mut record);
        // a failed write leaves the live state untouched
        self.persist(sink, &record)?;
        match sink {
            SinkId::Global => state.global = record,
            SinkId::Tenant(id) => {
                state.tenants.insert(id, record);
            }
        }
        info!(sink = %sink, "Sink settings saved");
        Ok(())
    }

    fn persist(&self, sink: SinkId, record: &SinkRecord) -> Result<(), ContractError> {
        let path = match (&self.persistence, sink) {
            (Persistence::Memory, _) => return Ok(()),
            (Persistence::Disk { global_path, .. }, SinkId::Global) => global_path.clone(),
            (Persistence::Disk { tenants_dir, .. }, SinkId::Tenant(id)) => {
                tenants_dir.join(format!("{id}.json"))
            }
        };
        write_record(&path, record)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, ContractError> {
        self.state
            .read()
            .map_err(|_| ContractError::config_unavailable("settings store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, ContractError> {
        self.state
            .write()
            .map_err(|_| ContractError::config_unavailable("settings store lock poisoned"))
    }
}

impl SinkConfigProvider for SinkSettingsStore {
    fn sink_config(&self, sink: SinkId) -> Result<Option<SinkConfig>, ContractError> {
        Ok(self.record(sink)?.to_config())
    }

    fn tenant_sinks(&self) -> Result<Vec<TenantId>, ContractError> {
        let state = self.read()?;
        Ok(state
            .tenants
            .iter()
            .filter(|(_, record)| record.destination().is_some())
            .map(|(id, _)| *id)
            .collect())
    }
}

fn load_state(global_path: &Path, tenants_dir: &Path) -> Result<StoreState, ContractError> {
    let global = if global_path.exists() {
        let content = fs::read_to_string(global_path)?;
        parse_record(&content).unwrap_or_else(|e| {
            warn!(path = %global_path.display(), error = %e, "Unreadable global settings, using defaults");
            SinkRecord::default()
        })
    } else {
        SinkRecord::default()
    };

    let mut tenants = BTreeMap::new();
    if tenants_dir.exists() {
        for entry in fs::read_dir(tenants_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<TenantId>().ok())
            else {
                continue;
            };
            let record = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| parse_record(&content).map_err(|e| e.to_string()))
                .unwrap_or_else(|e| {
                    warn!(tenant = id, error = %e, "Unreadable tenant settings, using defaults");
                    SinkRecord::default()
                });
            tenants.insert(id, record);
        }
    }

    Ok(StoreState { global, tenants })
}

fn parse_record(content: &str) -> Result<SinkRecord, serde_json::Error> {
    let mut record: SinkRecord = serde_json::from_str(content)?;
    if record.stream.normalize() {
        warn!(
            chunk_limit = record.stream.chunk_limit,
            "Persisted chunk_limit below minimum, normalized"
        );
    }
    Ok(record)
}

fn write_record(path: &Path, record: &SinkRecord) -> Result<(), ContractError> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| ContractError::Other(format!("settings serialize error: {e}")))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

//! Storage traits of the protocol library, mapped onto `wa_state` namespaces.

use super::{compound_key, SessionStore};
use async_trait::async_trait;
use wacore::appstate::hash::HashState;
use wacore::appstate::processor::AppStateMutationMAC;
use wacore::store::error::{db_err, StoreError};
use wacore::store::traits::{
    AppStateSyncKey, AppSyncStore, DeviceListRecord, DeviceStore, LidPnMappingEntry,
    ProtocolStore, SignalStore,
};
use wacore::store::Device;

type Result<T> = wacore::store::error::Result<T>;

const IDENTITY: &str = "identity";
const SESSION: &str = "session";
const PREKEY: &str = "prekey";
const SIGNED_PREKEY: &str = "signed_prekey";
const SENDER_KEY: &str = "sender_key";
const SYNC_KEY: &str = "app_sync_key";
const APP_VERSION: &str = "app_version";
const MUTATION_MAC: &str = "mutation_mac";
const SKDM: &str = "skdm";
const LID: &str = "lid";
const PN: &str = "pn";
const BASE_KEY: &str = "base_key";
const DEVICE_LIST: &str = "device_list";
const FORGET: &str = "forget_sender_key";
const DEVICE: &str = "device";
const DEVICE_ID: &[u8] = b"1";

fn ser_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(e.to_string())
}

fn id_key(id: u32) -> [u8; 4] {
    id.to_be_bytes()
}

/// Second part of every key under `prefix`, decoded as UTF-8.
fn suffixes(rows: Vec<(Vec<u8>, Vec<u8>)>, prefix: &[u8]) -> Vec<String> {
    rows.into_iter()
        .filter_map(|(k, _)| String::from_utf8(k[prefix.len()..].to_vec()).ok())
        .collect()
}

#[async_trait]
impl SignalStore for SessionStore {
    async fn put_identity(&self, address: &str, key: [u8; 32]) -> Result<()> {
        self.put(IDENTITY, address.as_bytes(), &key)
            .await
            .map_err(db_err)
    }

    async fn load_identity(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.get(IDENTITY, address.as_bytes()).await.map_err(db_err)
    }

    async fn delete_identity(&self, address: &str) -> Result<()> {
        self.delete(IDENTITY, address.as_bytes())
            .await
            .map_err(db_err)
    }

    async fn get_session(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.get(SESSION, address.as_bytes()).await.map_err(db_err)
    }

    async fn put_session(&self, address: &str, session: &[u8]) -> Result<()> {
        self.put(SESSION, address.as_bytes(), session)
            .await
            .map_err(db_err)
    }

    async fn delete_session(&self, address: &str) -> Result<()> {
        self.delete(SESSION, address.as_bytes())
            .await
            .map_err(db_err)
    }

    async fn store_prekey(&self, id: u32, record: &[u8], _uploaded: bool) -> Result<()> {
        self.put(PREKEY, &id_key(id), record).await.map_err(db_err)
    }

    async fn load_prekey(&self, id: u32) -> Result<Option<Vec<u8>>> {
        self.get(PREKEY, &id_key(id)).await.map_err(db_err)
    }

    async fn remove_prekey(&self, id: u32) -> Result<()> {
        self.delete(PREKEY, &id_key(id)).await.map_err(db_err)
    }

    async fn store_signed_prekey(&self, id: u32, record: &[u8]) -> Result<()> {
        self.put(SIGNED_PREKEY, &id_key(id), record)
            .await
            .map_err(db_err)
    }

    async fn load_signed_prekey(&self, id: u32) -> Result<Option<Vec<u8>>> {
        self.get(SIGNED_PREKEY, &id_key(id)).await.map_err(db_err)
    }

    async fn load_all_signed_prekeys(&self) -> Result<Vec<(u32, Vec<u8>)>> {
        let rows = self.scan(SIGNED_PREKEY).await.map_err(db_err)?;
        Ok(rows
            .into_iter()
            .filter_map(|(k, v)| {
                let id: [u8; 4] = k.as_slice().try_into().ok()?;
                Some((u32::from_be_bytes(id), v))
            })
            .collect())
    }

    async fn remove_signed_prekey(&self, id: u32) -> Result<()> {
        self.delete(SIGNED_PREKEY, &id_key(id))
            .await
            .map_err(db_err)
    }

    async fn put_sender_key(&self, address: &str, record: &[u8]) -> Result<()> {
        self.put(SENDER_KEY, address.as_bytes(), record)
            .await
            .map_err(db_err)
    }

    async fn get_sender_key(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.get(SENDER_KEY, address.as_bytes())
            .await
            .map_err(db_err)
    }

    async fn delete_sender_key(&self, address: &str) -> Result<()> {
        self.delete(SENDER_KEY, address.as_bytes())
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl AppSyncStore for SessionStore {
    async fn get_sync_key(&self, key_id: &[u8]) -> Result<Option<AppStateSyncKey>> {
        let Some(raw) = self.get(SYNC_KEY, key_id).await.map_err(db_err)? else {
            return Ok(None);
        };
        let (key_data, timestamp, fingerprint): (Vec<u8>, i64, Vec<u8>) =
            serde_json::from_slice(&raw).map_err(ser_err)?;
        Ok(Some(AppStateSyncKey {
            key_data,
            timestamp,
            fingerprint,
        }))
    }

    async fn set_sync_key(&self, key_id: &[u8], key: AppStateSyncKey) -> Result<()> {
        let raw = serde_json::to_vec(&(&key.key_data, key.timestamp, &key.fingerprint))
            .map_err(ser_err)?;
        self.put(SYNC_KEY, key_id, &raw).await.map_err(db_err)
    }

    async fn get_version(&self, name: &str) -> Result<HashState> {
        match self.get(APP_VERSION, name.as_bytes()).await.map_err(db_err)? {
            Some(raw) => serde_json::from_slice(&raw).map_err(ser_err),
            None => Ok(HashState::default()),
        }
    }

    async fn set_version(&self, name: &str, state: HashState) -> Result<()> {
        let raw = serde_json::to_vec(&state).map_err(ser_err)?;
        self.put(APP_VERSION, name.as_bytes(), &raw)
            .await
            .map_err(db_err)
    }

    async fn put_mutation_macs(
        &self,
        name: &str,
        _version: u64,
        mutations: &[AppStateMutationMAC],
    ) -> Result<()> {
        for m in mutations {
            let key = compound_key(&[name.as_bytes(), &m.index_mac]);
            self.put(MUTATION_MAC, &key, &m.value_mac)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    async fn get_mutation_mac(&self, name: &str, index_mac: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = compound_key(&[name.as_bytes(), index_mac]);
        self.get(MUTATION_MAC, &key).await.map_err(db_err)
    }

    async fn delete_mutation_macs(&self, name: &str, index_macs: &[Vec<u8>]) -> Result<()> {
        for mac in index_macs {
            let key = compound_key(&[name.as_bytes(), mac]);
            self.delete(MUTATION_MAC, &key).await.map_err(db_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolStore for SessionStore {
    async fn get_skdm_recipients(&self, group_jid: &str) -> Result<Vec<String>> {
        let prefix = compound_key(&[group_jid.as_bytes(), b""]);
        let rows = self.scan_prefix(SKDM, &prefix).await.map_err(db_err)?;
        Ok(suffixes(rows, &prefix))
    }

    async fn add_skdm_recipients(&self, group_jid: &str, device_jids: &[String]) -> Result<()> {
        for device in device_jids {
            let key = compound_key(&[group_jid.as_bytes(), device.as_bytes()]);
            self.put(SKDM, &key, b"").await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn clear_skdm_recipients(&self, group_jid: &str) -> Result<()> {
        let prefix = compound_key(&[group_jid.as_bytes(), b""]);
        for (key, _) in self.scan_prefix(SKDM, &prefix).await.map_err(db_err)? {
            self.delete(SKDM, &key).await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn get_lid_mapping(&self, lid: &str) -> Result<Option<LidPnMappingEntry>> {
        let Some(raw) = self.get(LID, lid.as_bytes()).await.map_err(db_err)? else {
            return Ok(None);
        };
        let (phone_number, created_at, updated_at, learning_source): (String, i64, i64, String) =
            serde_json::from_slice(&raw).map_err(ser_err)?;
        Ok(Some(LidPnMappingEntry {
            lid: lid.to_string(),
            phone_number,
            created_at,
            updated_at,
            learning_source,
        }))
    }

    async fn get_pn_mapping(&self, phone: &str) -> Result<Option<LidPnMappingEntry>> {
        match self.get(PN, phone.as_bytes()).await.map_err(db_err)? {
            Some(lid) => {
                let lid = String::from_utf8(lid).map_err(ser_err)?;
                self.get_lid_mapping(&lid).await
            }
            None => Ok(None),
        }
    }

    async fn put_lid_mapping(&self, entry: &LidPnMappingEntry) -> Result<()> {
        let raw = serde_json::to_vec(&(
            &entry.phone_number,
            entry.created_at,
            entry.updated_at,
            &entry.learning_source,
        ))
        .map_err(ser_err)?;
        self.put(LID, entry.lid.as_bytes(), &raw)
            .await
            .map_err(db_err)?;
        self.put(PN, entry.phone_number.as_bytes(), entry.lid.as_bytes())
            .await
            .map_err(db_err)
    }

    async fn get_all_lid_mappings(&self) -> Result<Vec<LidPnMappingEntry>> {
        let mut entries = Vec::new();
        for (lid, _) in self.scan(LID).await.map_err(db_err)? {
            let lid = String::from_utf8(lid).map_err(ser_err)?;
            if let Some(entry) = self.get_lid_mapping(&lid).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn save_base_key(&self, address: &str, message_id: &str, base_key: &[u8]) -> Result<()> {
        let key = compound_key(&[address.as_bytes(), message_id.as_bytes()]);
        self.put(BASE_KEY, &key, base_key).await.map_err(db_err)
    }

    async fn has_same_base_key(
        &self,
        address: &str,
        message_id: &str,
        current_base_key: &[u8],
    ) -> Result<bool> {
        let key = compound_key(&[address.as_bytes(), message_id.as_bytes()]);
        let stored = self.get(BASE_KEY, &key).await.map_err(db_err)?;
        Ok(stored.is_some_and(|k| k == current_base_key))
    }

    async fn delete_base_key(&self, address: &str, message_id: &str) -> Result<()> {
        let key = compound_key(&[address.as_bytes(), message_id.as_bytes()]);
        self.delete(BASE_KEY, &key).await.map_err(db_err)
    }

    async fn update_device_list(&self, record: DeviceListRecord) -> Result<()> {
        let raw = serde_json::to_vec(&record).map_err(ser_err)?;
        self.put(DEVICE_LIST, record.user.as_bytes(), &raw)
            .await
            .map_err(db_err)
    }

    async fn get_devices(&self, user: &str) -> Result<Option<DeviceListRecord>> {
        match self.get(DEVICE_LIST, user.as_bytes()).await.map_err(db_err)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    async fn mark_forget_sender_key(&self, group_jid: &str, participant: &str) -> Result<()> {
        let key = compound_key(&[group_jid.as_bytes(), participant.as_bytes()]);
        self.put(FORGET, &key, b"").await.map_err(db_err)
    }

    async fn consume_forget_marks(&self, group_jid: &str) -> Result<Vec<String>> {
        let prefix = compound_key(&[group_jid.as_bytes(), b""]);
        let rows = self.scan_prefix(FORGET, &prefix).await.map_err(db_err)?;
        for (key, _) in &rows {
            self.delete(FORGET, key).await.map_err(db_err)?;
        }
        Ok(suffixes(rows, &prefix))
    }
}

#[async_trait]
impl DeviceStore for SessionStore {
    async fn save(&self, device: &Device) -> Result<()> {
        // serde_json cannot round-trip the device's fixed-size key arrays.
        let raw = bincode::serialize(device).map_err(ser_err)?;
        self.put(DEVICE, DEVICE_ID, &raw).await.map_err(db_err)
    }

    async fn load(&self) -> Result<Option<Device>> {
        match self.get(DEVICE, DEVICE_ID).await.map_err(db_err)? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.get(DEVICE, DEVICE_ID).await.map_err(db_err)?.is_some())
    }

    async fn create(&self) -> Result<i32> {
        Ok(1)
    }
}

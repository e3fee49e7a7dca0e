//! JSON shapes exchanged with `kubectl`.

use crate::{Certificate, Result, RotorError, SecretManifest, SecretPatch, SecretRef, WorkloadKind};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Metadata keys assigned by the API server; re-applying them causes conflicts.
const SERVER_METADATA: &[&str] = &[
    "resourceVersion",
    "uid",
    "creationTimestamp",
    "managedFields",
    "selfLink",
    "generation",
];

const LAST_APPLIED: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Removes server-managed metadata from an exported object.
pub(crate) fn strip_server_metadata(mut object: Value) -> Value {
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        for key in SERVER_METADATA {
            metadata.remove(*key);
        }

        let drop_annotations = match metadata.get_mut("annotations").and_then(Value::as_object_mut) {
            Some(annotations) => {
                annotations.remove(LAST_APPLIED);
                annotations.is_empty()
            }
            None => false,
        };
        if drop_annotations {
            metadata.remove("annotations");
        }
    }
    object
}

/// Extracts the namespace and name of a secret document.
pub(crate) fn secret_ref_of(object: &Value) -> Result<SecretRef> {
    if object.get("kind").and_then(Value::as_str) != Some("Secret") {
        return Err(RotorError::Other(anyhow::anyhow!(
            "document is not a Secret object"
        )));
    }

    let metadata = object
        .get("metadata")
        .ok_or_else(|| RotorError::Other(anyhow::anyhow!("document has no metadata")))?;
    let name = metadata
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RotorError::Other(anyhow::anyhow!("document has no metadata.name")))?;
    let namespace = metadata
        .get("namespace")
        .and_then(Value::as_str)
        .ok_or_else(|| RotorError::Other(anyhow::anyhow!("document has no metadata.namespace")))?;

    SecretRef::new(namespace, name)
}

/// Decodes one base64 `data` field of a secret object.
pub(crate) fn decode_field(object: &Value, key: &str) -> Result<Option<String>> {
    let Some(encoded) = object
        .get("data")
        .and_then(|d| d.get(key))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| RotorError::Other(anyhow::anyhow!("field {} is not valid base64: {}", key, e)))?;
    let value = String::from_utf8(bytes)
        .map_err(|e| RotorError::Other(anyhow::anyhow!("field {} is not UTF-8: {}", key, e)))?;
    Ok(Some(value))
}

fn encode_fields(fields: &BTreeMap<String, SecretString>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| {
            (
                k.clone(),
                Value::String(STANDARD.encode(v.expose_secret().as_bytes())),
            )
        })
        .collect()
}

/// Builds a JSON merge patch that overwrites only the patched keys.
pub(crate) fn data_patch(patch: &SecretPatch) -> Value {
    json!({ "data": Value::Object(encode_fields(&patch.fields)) })
}

/// Builds a complete opaque Secret object.
pub(crate) fn secret_object(manifest: &SecretManifest) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "Opaque",
        "metadata": {
            "name": manifest.secret.name,
            "namespace": manifest.secret.namespace,
        },
        "data": Value::Object(encode_fields(&manifest.fields)),
    })
}

fn int_at(object: &Value, path: &[&str]) -> i64 {
    let mut cur = object;
    for key in path {
        match cur.get(*key) {
            Some(next) => cur = next,
            None => return 0,
        }
    }
    cur.as_i64().unwrap_or(0)
}

/// Reports whether a deployment or stateful set has fully rolled out.
///
/// The controller must have observed the latest generation and every desired
/// replica must be updated and ready.
pub(crate) fn rollout_complete(kind: WorkloadKind, object: &Value) -> bool {
    let generation = int_at(object, &["metadata", "generation"]);
    let observed = int_at(object, &["status", "observedGeneration"]);
    if observed < generation {
        return false;
    }

    let desired = object
        .get("spec")
        .and_then(|s| s.get("replicas"))
        .and_then(Value::as_i64)
        .unwrap_or(1);
    let updated = int_at(object, &["status", "updatedReplicas"]);
    let total = int_at(object, &["status", "replicas"]);

    match kind {
        WorkloadKind::Deployment => {
            let available = int_at(object, &["status", "availableReplicas"]);
            updated >= desired && total <= updated && available >= desired
        }
        WorkloadKind::StatefulSet => {
            let ready = int_at(object, &["status", "readyReplicas"]);
            let revisions_match = object
                .get("status")
                .map(|s| s.get("currentRevision") == s.get("updateRevision"))
                .unwrap_or(false);
            updated >= desired && ready >= desired && revisions_match
        }
    }
}

/// Names of pods whose phase is neither Running nor Succeeded.
pub(crate) fn unready_pod_names(list: &Value) -> Vec<String> {
    list.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|pod| {
                    let phase = pod
                        .get("status")
                        .and_then(|s| s.get("phase"))
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown");
                    if phase == "Running" || phase == "Succeeded" {
                        return None;
                    }
                    let name = pod
                        .get("metadata")
                        .and_then(|m| m.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or("<unnamed>");
                    Some(format!("{} ({})", name, phase))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Certificates listed in a `certificates.cert-manager.io` response.
pub(crate) fn certificates(list: &Value, namespace: &str) -> Vec<Certificate> {
    list.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|cert| {
                    let name = cert.get("metadata")?.get("name")?.as_str()?;
                    let secret_name = cert.get("spec")?.get("secretName")?.as_str()?;
                    Some(Certificate {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                        secret_name: secret_name.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Reports whether a certificate carries `Ready=True`.
pub(crate) fn certificate_is_ready(object: &Value) -> bool {
    object
        .get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(Value::as_array)
        .map(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some("Ready")
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
        .unwrap_or(false)
}

/// Number of entries in a list response.
pub(crate) fn item_count(list: &Value) -> usize {
    list.get("items")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

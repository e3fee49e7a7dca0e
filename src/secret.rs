//! Typed secret references and mutation requests.
//!
//! Mutations against the secret store are expressed as [`SecretPatch`]
//! (overwrite named fields of an existing object) or [`SecretManifest`]
//! (create-or-replace a whole object). Both validate every name on
//! construction, so nothing malformed ever reaches a backend.

use crate::validation::{validate_field_key, validate_namespace, validate_resource_name};
use crate::Result;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one secret object in the external store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretRef {
    /// Namespace the object lives in
    pub namespace: String,

    /// Object name
    pub name: String,
}

impl SecretRef {
    /// Creates a validated reference.
    ///
    /// # Example
    ///
    /// ```
    /// use keyrotor::SecretRef;
    ///
    /// let secret = SecretRef::new("n8n", "postgres-secrets").unwrap();
    /// assert_eq!(secret.to_string(), "n8n/postgres-secrets");
    ///
    /// assert!(SecretRef::new("n8n", "bad name").is_err());
    /// assert!(SecretRef::new("team.apps", "grafana-admin").is_err());
    /// ```
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let name = name.into();
        validate_namespace(&namespace)?;
        validate_resource_name(&name)?;
        Ok(Self { namespace, name })
    }

    /// File name used for this object inside a backup snapshot.
    pub fn export_file_name(&self) -> String {
        format!("{}.{}.json", self.namespace, self.name)
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Overwrites specific fields of an existing secret object.
///
/// Fields not named in the patch are left untouched.
#[derive(Debug)]
pub struct SecretPatch {
    /// Target object
    pub secret: SecretRef,

    /// Field key to new plaintext value
    pub fields: BTreeMap<String, SecretString>,
}

impl SecretPatch {
    /// Starts an empty patch against `secret`.
    pub fn new(secret: SecretRef) -> Self {
        Self {
            secret,
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field to the patch.
    pub fn field(mut self, key: impl Into<String>, value: SecretString) -> Result<Self> {
        let key = key.into();
        validate_field_key(&key)?;
        self.fields.insert(key, value);
        Ok(self)
    }

    /// Returns the patched field keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// A complete secret object, applied with create-or-replace semantics.
#[derive(Debug)]
pub struct SecretManifest {
    /// Target object
    pub secret: SecretRef,

    /// Full field set of the object
    pub fields: BTreeMap<String, SecretString>,
}

impl SecretManifest {
    /// Starts an empty manifest for `secret`.
    pub fn new(secret: SecretRef) -> Self {
        Self {
            secret,
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field to the manifest.
    pub fn field(mut self, key: impl Into<String>, value: SecretString) -> Result<Self> {
        let key = key.into();
        validate_field_key(&key)?;
        self.fields.insert(key, value);
        Ok(self)
    }
}

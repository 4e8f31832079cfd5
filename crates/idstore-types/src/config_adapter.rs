//! Adapter that stores identity provider configuration: clients, identity
//! resources and API resources.
//!
//! A [`ConfigurationStore`] is shared for the lifetime of the process. Each
//! logical operation opens its own [`ConfigurationContext`], queues changes on
//! it and persists them with one `save_changes()` call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;
use uuid::Uuid;

use crate::prelude::*;
use crate::utils::{require_non_empty, require_unique};

pub const DEFAULT_ACCESS_TOKEN_LIFETIME: i64 = 3600;

/// A scope a client is allowed to request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientScope {
	pub id: Uuid,
	pub scope: Box<str>,
	/// Row id of the owning client
	pub client_id: Uuid,
}

impl ClientScope {
	pub fn new(client_id: Uuid, scope: impl Into<Box<str>>) -> Self {
		ClientScope { id: Uuid::new_v4(), scope: scope.into(), client_id }
	}
}

/// A registered application
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Client {
	pub id: Uuid,
	/// OAuth client identifier
	pub client_id: Box<str>,
	pub client_name: Option<Box<str>>,
	pub description: Option<Box<str>>,
	pub enabled: bool,
	pub require_consent: bool,
	pub allow_offline_access: bool,
	/// Access token lifetime in seconds
	pub access_token_lifetime: i64,
	pub redirect_uris: Vec<Box<str>>,
	pub allowed_grant_types: Vec<Box<str>>,
	pub scopes: Vec<ClientScope>,
	/// Concurrency token, incremented by every successful update
	pub version: i64,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl Client {
	pub fn new(client_id: impl Into<Box<str>>) -> Self {
		let created_at = now();
		Client {
			id: Uuid::new_v4(),
			client_id: client_id.into(),
			client_name: None,
			description: None,
			enabled: true,
			require_consent: false,
			allow_offline_access: false,
			access_token_lifetime: DEFAULT_ACCESS_TOKEN_LIFETIME,
			redirect_uris: Vec::new(),
			allowed_grant_types: Vec::new(),
			scopes: Vec::new(),
			version: 1,
			created_at,
			updated_at: created_at,
		}
	}

	/// Attach a scope owned by this client
	pub fn add_scope(&mut self, scope: impl Into<Box<str>>) -> &mut Self {
		self.scopes.push(ClientScope::new(self.id, scope));
		self
	}

	pub fn has_scope(&self, scope: &str) -> bool {
		self.scopes.iter().any(|s| s.scope.as_ref() == scope)
	}

	pub fn validate(&self) -> ClResult<()> {
		require_non_empty("client_id", &self.client_id)?;
		for scope in &self.scopes {
			require_non_empty("scope", &scope.scope)?;
			if scope.client_id != self.id {
				return Err(Error::ValidationError(format!(
					"scope {} belongs to another client",
					scope.scope
				)));
			}
		}
		require_unique("scope", self.scopes.iter().map(|s| s.scope.as_ref()))
	}
}

/// A set of user claims requestable through a scope (e.g. `openid`, `profile`)
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdentityResource {
	pub id: Uuid,
	pub name: Box<str>,
	pub display_name: Option<Box<str>>,
	pub description: Option<Box<str>>,
	pub enabled: bool,
	pub required: bool,
	pub emphasize: bool,
	pub show_in_discovery_document: bool,
	pub user_claims: Vec<Box<str>>,
	pub version: i64,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl IdentityResource {
	pub fn new(name: impl Into<Box<str>>) -> Self {
		let created_at = now();
		IdentityResource {
			id: Uuid::new_v4(),
			name: name.into(),
			display_name: None,
			description: None,
			enabled: true,
			required: false,
			emphasize: false,
			show_in_discovery_document: true,
			user_claims: Vec::new(),
			version: 1,
			created_at,
			updated_at: created_at,
		}
	}

	pub fn validate(&self) -> ClResult<()> {
		require_non_empty("identity resource name", &self.name)?;
		require_unique("user claim", self.user_claims.iter().map(AsRef::as_ref))
	}
}

/// A protected API and the scopes that grant access to it
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiResource {
	pub id: Uuid,
	pub name: Box<str>,
	pub display_name: Option<Box<str>>,
	pub description: Option<Box<str>>,
	pub enabled: bool,
	pub scopes: Vec<Box<str>>,
	pub user_claims: Vec<Box<str>>,
	pub version: i64,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl ApiResource {
	pub fn new(name: impl Into<Box<str>>) -> Self {
		let created_at = now();
		ApiResource {
			id: Uuid::new_v4(),
			name: name.into(),
			display_name: None,
			description: None,
			enabled: true,
			scopes: Vec::new(),
			user_claims: Vec::new(),
			version: 1,
			created_at,
			updated_at: created_at,
		}
	}

	pub fn validate(&self) -> ClResult<()> {
		require_non_empty("api resource name", &self.name)?;
		for scope in &self.scopes {
			require_non_empty("api scope", scope)?;
		}
		require_unique("api scope", self.scopes.iter().map(AsRef::as_ref))
	}
}

/// A configuration store shared by all requests
#[async_trait]
pub trait ConfigurationStore: Debug + Send + Sync {
	/// Open a new unit of work. The context holds one pooled connection until
	/// it is closed or dropped.
	async fn open(&self) -> ClResult<Box<dyn ConfigurationContext>>;

	/// Schema version of the backing database
	async fn schema_version(&self) -> ClResult<i64>;
}

/// One unit of work on the configuration store.
///
/// Reads see committed data only; queued changes become visible after
/// `save_changes()`. Every method fails with [`Error::Disposed`] after `close()`.
#[async_trait]
pub trait ConfigurationContext: Send {
	// Clients
	//*********
	async fn read_client(&mut self, id: Uuid) -> ClResult<Option<Client>>;
	/// Look up a client by its OAuth `client_id`
	async fn find_client(&mut self, client_id: &str) -> ClResult<Option<Client>>;
	async fn list_clients(&mut self) -> ClResult<Vec<Client>>;
	fn add_client(&mut self, client: Client) -> ClResult<()>;
	/// Replace a client and its scopes. Fails on save with a conflict if the
	/// stored version differs from `client.version`.
	fn update_client(&mut self, client: Client) -> ClResult<()>;
	/// Remove a client together with its scopes
	fn remove_client(&mut self, client: &Client) -> ClResult<()>;

	// Identity resources
	//********************
	async fn read_identity_resource(&mut self, id: Uuid) -> ClResult<Option<IdentityResource>>;
	async fn find_identity_resource(&mut self, name: &str) -> ClResult<Option<IdentityResource>>;
	async fn find_identity_resources_by_scope(
		&mut self,
		names: &[&str],
	) -> ClResult<Vec<IdentityResource>>;
	async fn list_identity_resources(&mut self) -> ClResult<Vec<IdentityResource>>;
	fn add_identity_resource(&mut self, resource: IdentityResource) -> ClResult<()>;
	fn update_identity_resource(&mut self, resource: IdentityResource) -> ClResult<()>;
	fn remove_identity_resource(&mut self, resource: &IdentityResource) -> ClResult<()>;

	// API resources
	//***************
	async fn read_api_resource(&mut self, id: Uuid) -> ClResult<Option<ApiResource>>;
	async fn find_api_resource(&mut self, name: &str) -> ClResult<Option<ApiResource>>;
	/// API resources exposing any of the given scopes
	async fn find_api_resources_by_scope(&mut self, scopes: &[&str]) -> ClResult<Vec<ApiResource>>;
	async fn list_api_resources(&mut self) -> ClResult<Vec<ApiResource>>;
	fn add_api_resource(&mut self, resource: ApiResource) -> ClResult<()>;
	fn update_api_resource(&mut self, resource: ApiResource) -> ClResult<()>;
	fn remove_api_resource(&mut self, resource: &ApiResource) -> ClResult<()>;

	// Unit of work
	//**************
	fn has_changes(&self) -> bool;
	fn discard_changes(&mut self);
	/// Persist all queued changes in one transaction and return the number of
	/// affected rows. On failure nothing is written and the changes stay queued.
	///
	/// If a previous save was cancelled while committing, its changes are
	/// dropped from the queue and this call fails with
	/// [`PersistenceError::Interrupted`].
	async fn save_changes(&mut self) -> ClResult<u64>;
	/// Release the connection. Queued changes are discarded.
	fn close(&mut self);
	fn is_closed(&self) -> bool;
}

/// Open a context, run `f` with it and close it whatever `f` returned
pub async fn with_configuration<T, F>(store: &dyn ConfigurationStore, f: F) -> ClResult<T>
where
	F: AsyncFnOnce(&mut dyn ConfigurationContext) -> ClResult<T>,
{
	let mut ctx = store.open().await?;
	let res = f(&mut *ctx).await;
	ctx.close();
	res
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_client_scopes_are_owned() {
		let mut client = Client::new("web");
		client.add_scope("openid").add_scope("profile");

		assert_eq!(client.scopes.len(), 2);
		assert!(client.scopes.iter().all(|s| s.client_id == client.id));
		assert!(client.has_scope("profile"));
		assert!(!client.has_scope("email"));
		assert!(client.validate().is_ok());
	}

	#[test]
	fn test_client_validation() {
		let mut client = Client::new("web");
		client.add_scope("");
		assert!(matches!(client.validate(), Err(Error::ValidationError(_))));

		let mut client = Client::new("web");
		client.add_scope("openid").add_scope("openid");
		assert!(matches!(client.validate(), Err(Error::ValidationError(_))));

		let mut client = Client::new("web");
		client.scopes.push(ClientScope::new(Uuid::new_v4(), "openid"));
		assert!(matches!(client.validate(), Err(Error::ValidationError(_))));

		assert!(Client::new(" ").validate().is_err());
	}

	#[test]
	fn test_resource_validation() {
		let mut api = ApiResource::new("orders");
		api.scopes = vec!["orders.read".into(), "orders.write".into()];
		assert!(api.validate().is_ok());
		api.scopes.push("orders.read".into());
		assert!(api.validate().is_err());

		assert!(IdentityResource::new("openid").validate().is_ok());
		assert!(IdentityResource::new("").validate().is_err());
	}

	#[test]
	fn test_client_serialization_skips_none() {
		let client = Client::new("web");
		let json = serde_json::to_value(&client).unwrap();
		assert_eq!(json["client_id"], "web");
		assert!(json.get("client_name").is_none());
		assert_eq!(json["access_token_lifetime"], DEFAULT_ACCESS_TOKEN_LIFETIME);
	}
}

// vim: ts=4

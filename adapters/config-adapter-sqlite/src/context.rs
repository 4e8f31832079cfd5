//! Unit of work over one pooled connection

use async_trait::async_trait;
use sqlx::{Connection, Sqlite, SqliteConnection, pool::PoolConnection};
use uuid::Uuid;

use crate::{client, resource, utils::*};
use idstore_types::{config_adapter::*, prelude::*};

/// A queued change, applied in order by `save_changes()`
#[derive(Debug)]
enum Change {
	AddClient(Client),
	UpdateClient(Client),
	RemoveClient { id: Uuid, version: i64 },
	AddIdentityResource(IdentityResource),
	UpdateIdentityResource(IdentityResource),
	RemoveIdentityResource { id: Uuid, version: i64 },
	AddApiResource(ApiResource),
	UpdateApiResource(ApiResource),
	RemoveApiResource { id: Uuid, version: i64 },
}

impl Change {
	async fn apply(&self, conn: &mut SqliteConnection) -> ClResult<u64> {
		match self {
			Change::AddClient(c) => client::insert_client(conn, c).await,
			Change::UpdateClient(c) => client::update_client(conn, c).await,
			Change::RemoveClient { id, version } => {
				client::delete_client(conn, *id, *version).await
			}
			Change::AddIdentityResource(r) => resource::insert_identity_resource(conn, r).await,
			Change::UpdateIdentityResource(r) => resource::update_identity_resource(conn, r).await,
			Change::RemoveIdentityResource { id, version } => {
				resource::delete_identity_resource(conn, *id, *version).await
			}
			Change::AddApiResource(r) => resource::insert_api_resource(conn, r).await,
			Change::UpdateApiResource(r) => resource::update_api_resource(conn, r).await,
			Change::RemoveApiResource { id, version } => {
				resource::delete_api_resource(conn, *id, *version).await
			}
		}
	}
}

#[derive(Debug)]
pub struct SqliteConfigurationContext {
	conn: Option<PoolConnection<Sqlite>>,
	pending: Vec<Change>,
	/// Leading queued changes whose commit was cancelled before it returned
	in_doubt: usize,
}

impl SqliteConfigurationContext {
	pub(crate) fn new(conn: PoolConnection<Sqlite>) -> Self {
		Self { conn: Some(conn), pending: Vec::new(), in_doubt: 0 }
	}

	fn conn(&mut self) -> ClResult<&mut SqliteConnection> {
		self.conn.as_deref_mut().ok_or(Error::Disposed)
	}

	fn queue(&mut self, change: Change) -> ClResult<()> {
		if self.conn.is_none() {
			return Err(Error::Disposed);
		}
		self.pending.push(change);
		Ok(())
	}

	/// Drop changes left behind by a save cancelled during commit. They must
	/// not be applied again, so the caller gets `Interrupted` instead.
	fn settle(&mut self) -> ClResult<()> {
		if self.in_doubt == 0 {
			return Ok(());
		}
		let n = self.in_doubt.min(self.pending.len());
		warn!("Dropping {} configuration changes from a save cancelled during commit", n);
		self.pending.drain(..n);
		self.in_doubt = 0;
		Err(PersistenceError::Interrupted.into())
	}
}

impl Drop for SqliteConfigurationContext {
	fn drop(&mut self) {
		let unsaved = self.pending.len().saturating_sub(self.in_doubt);
		if unsaved > 0 {
			warn!("Configuration context dropped with {} unsaved changes", unsaved);
		}
	}
}

#[async_trait]
impl ConfigurationContext for SqliteConfigurationContext {
	// Clients
	//*********
	async fn read_client(&mut self, id: Uuid) -> ClResult<Option<Client>> {
		client::read_client(self.conn()?, id).await
	}

	async fn find_client(&mut self, client_id: &str) -> ClResult<Option<Client>> {
		client::find_client(self.conn()?, client_id).await
	}

	async fn list_clients(&mut self) -> ClResult<Vec<Client>> {
		client::list_clients(self.conn()?).await
	}

	fn add_client(&mut self, client: Client) -> ClResult<()> {
		client.validate()?;
		self.queue(Change::AddClient(client))
	}

	fn update_client(&mut self, client: Client) -> ClResult<()> {
		client.validate()?;
		self.queue(Change::UpdateClient(client))
	}

	fn remove_client(&mut self, client: &Client) -> ClResult<()> {
		self.queue(Change::RemoveClient { id: client.id, version: client.version })
	}

	// Identity resources
	//********************
	async fn read_identity_resource(&mut self, id: Uuid) -> ClResult<Option<IdentityResource>> {
		resource::read_identity_resource(self.conn()?, id).await
	}

	async fn find_identity_resource(&mut self, name: &str) -> ClResult<Option<IdentityResource>> {
		resource::find_identity_resource(self.conn()?, name).await
	}

	async fn find_identity_resources_by_scope(
		&mut self,
		names: &[&str],
	) -> ClResult<Vec<IdentityResource>> {
		resource::find_identity_resources_by_scope(self.conn()?, names).await
	}

	async fn list_identity_resources(&mut self) -> ClResult<Vec<IdentityResource>> {
		resource::list_identity_resources(self.conn()?).await
	}

	fn add_identity_resource(&mut self, resource: IdentityResource) -> ClResult<()> {
		resource.validate()?;
		self.queue(Change::AddIdentityResource(resource))
	}

	fn update_identity_resource(&mut self, resource: IdentityResource) -> ClResult<()> {
		resource.validate()?;
		self.queue(Change::UpdateIdentityResource(resource))
	}

	fn remove_identity_resource(&mut self, resource: &IdentityResource) -> ClResult<()> {
		self.queue(Change::RemoveIdentityResource { id: resource.id, version: resource.version })
	}

	// API resources
	//***************
	async fn read_api_resource(&mut self, id: Uuid) -> ClResult<Option<ApiResource>> {
		resource::read_api_resource(self.conn()?, id).await
	}

	async fn find_api_resource(&mut self, name: &str) -> ClResult<Option<ApiResource>> {
		resource::find_api_resource(self.conn()?, name).await
	}

	async fn find_api_resources_by_scope(&mut self, scopes: &[&str]) -> ClResult<Vec<ApiResource>> {
		resource::find_api_resources_by_scope(self.conn()?, scopes).await
	}

	async fn list_api_resources(&mut self) -> ClResult<Vec<ApiResource>> {
		resource::list_api_resources(self.conn()?).await
	}

	fn add_api_resource(&mut self, resource: ApiResource) -> ClResult<()> {
		resource.validate()?;
		self.queue(Change::AddApiResource(resource))
	}

	fn update_api_resource(&mut self, resource: ApiResource) -> ClResult<()> {
		resource.validate()?;
		self.queue(Change::UpdateApiResource(resource))
	}

	fn remove_api_resource(&mut self, resource: &ApiResource) -> ClResult<()> {
		self.queue(Change::RemoveApiResource { id: resource.id, version: resource.version })
	}

	// Unit of work
	//**************
	fn has_changes(&self) -> bool {
		self.pending.len() > self.in_doubt
	}

	fn discard_changes(&mut self) {
		self.pending.clear();
		self.in_doubt = 0;
	}

	async fn save_changes(&mut self) -> ClResult<u64> {
		self.settle()?;
		let Some(conn) = self.conn.as_mut() else {
			return Err(Error::Disposed);
		};
		if self.pending.is_empty() {
			return Ok(0);
		}

		// Dropping the transaction on an early return rolls it back
		let mut tx = conn.begin().await.map_err(db_err)?;
		let mut affected = 0;
		for change in &self.pending {
			affected += change.apply(&mut tx).await?;
		}
		// Cancelling this future while the commit is in flight leaves its outcome unknown
		self.in_doubt = self.pending.len();
		let committed = tx.commit().await.map_err(db_err);
		self.in_doubt = 0;
		committed?;

		debug!("Saved {} configuration changes, {} rows affected", self.pending.len(), affected);
		self.pending.clear();
		Ok(affected)
	}

	fn close(&mut self) {
		if self.conn.take().is_some() {
			if !self.pending.is_empty() {
				warn!("Discarding {} unsaved configuration changes", self.pending.len());
				self.pending.clear();
			}
			self.in_doubt = 0;
			debug!("Configuration context closed");
		}
	}

	fn is_closed(&self) -> bool {
		self.conn.is_none()
	}
}


// vim: ts=4

//! Walks a scan through its lifecycle against a mock backend: login, launch, background polling
//! until a terminal status, then logout, with credentials and jobs kept in a file-backed store.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use compliance_client::{
	client::ApiClient,
	config::{ClientConfig, PollingConfig},
	jobs::{JobRegistry, PollingOrchestrator, RegistryEvent},
	scanner::ScannerApi,
	session::ChannelNavigator,
	store::{FileStore, KeyValueStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/login");
			then.status(200).json_body(json!({ "session_token": "demo-access", "expires_in": 900 }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/scanner/scan");
			then.status(200).json_body(json!({ "session_id": "demo-session" }));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/scanner/session/status");
			then.status(200).json_body(json!({
				"status": "completed",
				"progress": { "pages_scanned": 18 },
				"message": "2 findings"
			}));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/logout");
			then.status(204);
		})
		.await;

	let mut polling = PollingConfig::default();

	polling.fast_interval = Duration::from_millis(200);
	polling.slow_interval = Duration::from_millis(500);

	let config = ClientConfig::builder(Url::parse(&server.base_url())?).polling(polling).build()?;
	let store: Arc<dyn KeyValueStore> =
		Arc::new(FileStore::open(std::env::temp_dir().join("compliance-client-demo.json"))?);
	let (navigator, mut redirects) = ChannelNavigator::channel();
	let client = ApiClient::new(config.clone(), store.clone(), Arc::new(navigator));
	let registry = JobRegistry::open(store, config.storage_keys.jobs.clone())?;
	let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
	let _subscription = registry.subscribe(move |event: &RegistryEvent| {
		println!("Registry event for {}: {event:?}.", event.session_id());

		if let RegistryEvent::Removed { reason, .. } = event {
			let _ = done_tx.send(reason.clone());
		}
	});

	client.login([("code", "demo-code")]).await?;

	let scanner = ScannerApi::new(client.clone());
	let _orchestrator = PollingOrchestrator::start(
		registry.clone(),
		Arc::new(scanner.clone()),
		config.polling.clone(),
		config.vocabulary.clone(),
	)?;
	let job = scanner.launch(&registry, "https://shop.example.com").await?;

	println!("Launched scan {} for {}.", job.session_id, job.target_url);

	if let Some(reason) = done_rx.recv().await {
		println!("Scan finished: {reason:?}.");
	}

	client.logout().await?;

	if let Some(redirect) = redirects.recv().await {
		println!("Re-authentication requested at {}.", redirect.location);
	}

	Ok(())
}

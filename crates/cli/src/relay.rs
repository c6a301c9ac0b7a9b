use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result, anyhow},
    secrecy::ExposeSecret,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use {
    courier_config::{CourierConfig, Severity, SheetsConfig, validate_config},
    courier_routing::{Dispatcher, RouteSynchronizer, RouteTableStore, SyncReport},
    courier_sheets::{ServiceAccountAuth, ServiceAccountKey, SheetsAuth, SheetsClient},
    courier_telegram::TelegramForwarder,
};

const SHEETS_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the Sheets client from config.
///
/// Service-account credentials win over an API key; inline base64 wins over
/// a key file.
pub fn sheets_client(config: &SheetsConfig) -> Result<SheetsClient> {
    let http = reqwest::Client::builder()
        .timeout(SHEETS_HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let key = if let Some(encoded) = &config.credentials_base64 {
        Some(ServiceAccountKey::from_base64(encoded.expose_secret())?)
    } else if let Some(file) = &config.credentials_file {
        let raw = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read credentials file {file}"))?;
        Some(ServiceAccountKey::from_json(&raw)?)
    } else {
        None
    };

    let auth = match (key, &config.api_key) {
        (Some(key), _) => {
            let auth = ServiceAccountAuth::new(key, http.clone())?;
            info!(account = auth.client_email(), "using service-account credentials");
            SheetsAuth::ServiceAccount(Box::new(auth))
        },
        (None, Some(api_key)) => {
            info!("using sheets API key");
            SheetsAuth::ApiKey(api_key.clone())
        },
        (None, None) => return Err(anyhow!("no sheets credentials configured")),
    };

    let mut client = SheetsClient::with_http(http, &config.spreadsheet_id, &config.tab, auth);
    if let Some(base) = &config.api_base {
        client = client.with_api_base(base);
    }
    Ok(client)
}

fn synchronizer(config: &CourierConfig, store: Arc<RouteTableStore>) -> Result<RouteSynchronizer> {
    let source = Arc::new(sheets_client(&config.sheets)?);
    Ok(RouteSynchronizer::new(source, store)
        .with_interval(Duration::from_secs(config.sync.interval_secs))
        .with_active_status(&config.sync.active_status))
}

/// Start the relay and run until ctrl-c.
pub async fn run(config: CourierConfig) -> Result<()> {
    let diagnostics = validate_config(&config);
    for d in &diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => info!(path = %d.path, "{}", d.message),
        }
    }
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        anyhow::bail!("configuration is incomplete; run `courier validate` for details");
    }

    let token = config
        .telegram
        .token
        .as_ref()
        .ok_or_else(|| anyhow!("telegram.token is not set"))?;
    let connection = courier_telegram::connect(token, config.telegram.poll_timeout_secs)
        .await
        .context("failed to connect to telegram")?;

    let store = Arc::new(RouteTableStore::new());
    let sync = synchronizer(&config, Arc::clone(&store))?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        Arc::new(TelegramForwarder::new(connection.bot.clone())),
    ));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown requested"),
                Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
            }
            cancel.cancel();
        }
    });

    info!(
        bot = ?connection.username,
        tab = %config.sheets.tab,
        interval_secs = config.sync.interval_secs,
        "courier relay running"
    );

    let sync_task = tokio::spawn(sync.run(cancel.clone()));
    let polling = courier_telegram::start_polling(
        connection.bot,
        dispatcher,
        config.telegram.poll_timeout_secs,
        cancel.clone(),
    );

    let (polled, synced) = tokio::join!(polling, sync_task);
    polled.context("telegram polling task failed")?;
    synced.context("route synchronizer task failed")?;
    info!("courier relay stopped");
    Ok(())
}

/// Run one synchronization and print the resulting table.
pub async fn check(config: CourierConfig, json: bool) -> Result<()> {
    let store = Arc::new(RouteTableStore::new());
    let report = synchronizer(&config, Arc::clone(&store))?
        .sync_once()
        .await
        .context("failed to read routing sheet")?;
    let table = store.snapshot();

    if json {
        let routes: serde_json::Map<String, serde_json::Value> = table
            .sorted()
            .into_iter()
            .map(|(key, entries)| -> Result<_> {
                Ok((key.to_string(), serde_json::to_value(entries)?))
            })
            .collect::<Result<_>>()?;
        let out = serde_json::json!({ "report": report, "routes": routes });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_report(&report);
    for (key, entries) in table.sorted() {
        let targets: Vec<String> = entries.iter().map(ToString::to_string).collect();
        println!("  {key} -> {}", targets.join(", "));
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!(
        "{} row(s): {} routed, {} inactive, {} without source, {} without target",
        report.rows, report.accepted, report.inactive, report.missing_source, report.missing_target
    );
    println!(
        "{} source(s), {} destination(s)\n",
        report.sources, report.entries
    );
}

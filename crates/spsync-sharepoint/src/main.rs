use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use spsync_core::{
    clean_up_default_view, remove_view, sync_content_type_formatter, upsert_columns, upsert_view,
    ColumnDefinition, DefaultViewCleanup, DriveItemRef, FormatterSync, LibraryRef, ViewSpec,
};
use spsync_sharepoint::config::{Command, Config, ItemArgs, LibraryArgs, Tenant};
use spsync_sharepoint::transfer::{pdf_file_name, work_file_path};
use spsync_sharepoint::{
    download_to_path, should_convert_to_pdf, upload, CertificateCredential, HttpTransport,
    MemoryTokenStore, SharePointClient, TokenManager, TokenStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    info!("Starting spsync");
    info!("  Graph: {}", config.graph_url);
    info!(
        "  Timeouts: request {}s, transfer {}s",
        config.request_timeout_secs, config.transfer_timeout_secs
    );

    // One pooled transport shared by every client
    let transport = Arc::new(HttpTransport::new(config.transport())?);
    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());

    match config.command.clone() {
        Command::Columns {
            tenant,
            library,
            definitions,
        } => {
            let client = connect(&config, tenant, &transport, &store)?;
            let library = resolve_library(&config, &client, tenant, &library).await?;
            let definitions: Vec<ColumnDefinition> = read_json(&definitions)?;

            let report = upsert_columns(&client.backend(), &library, &definitions).await?;
            info!(
                "Columns: {} created, {} modified, {} unchanged, {} failed",
                report.created.len(),
                report.modified.len(),
                report.unchanged.len(),
                report.failed.len()
            );
            if !report.failed.is_empty() {
                for (column, reason) in &report.failed {
                    error!("  {}: {}", column, reason);
                }
                anyhow::bail!("{} columns failed, run again to converge", report.failed.len());
            }
        }

        Command::View {
            tenant,
            library,
            spec,
        } => {
            let client = connect(&config, tenant, &transport, &store)?;
            let library = resolve_library(&config, &client, tenant, &library).await?;
            let spec: ViewSpec = read_json(&spec)?;

            let report = upsert_view(&client.backend(), &library, &spec).await?;
            info!(
                "View {} ({}): created={}, added {:?}, removed {:?}",
                spec.title, report.view_id, report.created, report.added, report.removed
            );
        }

        Command::RemoveView {
            tenant,
            library,
            title,
        } => {
            let client = connect(&config, tenant, &transport, &store)?;
            let library = resolve_library(&config, &client, tenant, &library).await?;

            if remove_view(&client.backend(), &library, &title).await? {
                info!("Removed view {}", title);
            } else {
                warn!("No view titled {} in {}", title, library.library_url);
            }
        }

        Command::CleanDefaultView {
            tenant,
            library,
            remove_fields,
            except_title,
        } => {
            let client = connect(&config, tenant, &transport, &store)?;
            let library = resolve_library(&config, &client, tenant, &library).await?;

            match clean_up_default_view(&client.backend(), &library, &remove_fields, &except_title)
                .await?
            {
                DefaultViewCleanup::Protected { title } => {
                    info!("Default view {} is protected, nothing removed", title)
                }
                DefaultViewCleanup::Cleaned { title, removed } => {
                    info!("Removed {:?} from default view {}", removed, title)
                }
            }
        }

        Command::ContentTypeFormatter {
            tenant,
            library,
            content_type,
            formatter,
        } => {
            let client = connect(&config, tenant, &transport, &store)?;
            let library = resolve_library(&config, &client, tenant, &library).await?;
            let formatter: Value = read_json(&formatter)?;

            match sync_content_type_formatter(&client.backend(), &library, &content_type, &formatter)
                .await?
            {
                FormatterSync::Unchanged => info!("Formatter of {} already correct", content_type),
                FormatterSync::Updated => info!("Updated formatter of {}", content_type),
            }
        }

        Command::ResolveList {
            tenant,
            library_url,
        } => {
            let client = connect(&config, tenant, &transport, &store)?;
            let resolved = client.graph.get_list_and_site_id(&library_url).await?;
            println!(
                "{}",
                serde_json::json!({
                    "siteId": resolved.site_id,
                    "listId": resolved.list_id,
                    "siteName": resolved.site_name,
                    "listName": resolved.list_name,
                    "tenantName": resolved.tenant,
                })
            );
        }

        Command::Download {
            tenant,
            item,
            pdf,
            output,
        } => {
            let client = connect(&config, tenant, &transport, &store)?;
            let written = download_to_path(&client.graph, &drive_item(&item), pdf, &output).await?;
            info!("Downloaded {} bytes to {}", written, output.display());
        }

        Command::Upload {
            tenant,
            library,
            file,
            name,
        } => {
            let client = connect(&config, tenant, &transport, &store)?;
            let library = resolve_library(&config, &client, tenant, &library).await?;
            let name = match name {
                Some(name) => name,
                None => local_file_name(&file)?,
            };

            let outcome = upload(&client.graph, &library, &file, &name).await?;
            info!(
                "Uploaded {} ({} bytes) in {:.1}s",
                name,
                outcome.size,
                outcome.duration.as_secs_f64()
            );
        }

        Command::Transfer {
            item,
            file_name,
            library,
            work_dir,
        } => {
            let source = connect(&config, Tenant::Source, &transport, &store)?;
            let destination = connect(&config, Tenant::Destination, &transport, &store)?;
            let library =
                resolve_library(&config, &destination, Tenant::Destination, &library).await?;

            let as_pdf = should_convert_to_pdf(&file_name, &config.convert_to_pdf_extensions);
            let target_name = if as_pdf {
                pdf_file_name(&file_name)
            } else {
                file_name.clone()
            };

            let work_dir = work_dir.unwrap_or_else(std::env::temp_dir);
            let local = work_file_path(&work_dir, &target_name);

            download_to_path(&source.graph, &drive_item(&item), as_pdf, &local).await?;
            let result = upload(&destination.graph, &library, &local, &target_name).await;
            if let Err(e) = tokio::fs::remove_file(&local).await {
                warn!("Failed to remove {}: {}", local.display(), e);
            }
            let outcome = result?;
            info!(
                "Transferred {} as {} ({} bytes, pdf={}) in {:.1}s",
                file_name,
                target_name,
                outcome.size,
                as_pdf,
                outcome.duration.as_secs_f64()
            );
        }
    }

    Ok(())
}

/// Build a client for one tenant from its certificate credential.
fn connect(
    config: &Config,
    tenant: Tenant,
    transport: &Arc<HttpTransport>,
    store: &Arc<dyn TokenStore>,
) -> anyhow::Result<SharePointClient> {
    let credentials = config.credentials(tenant)?;
    let credential = CertificateCredential::from_pem_file(
        transport.clone(),
        config.authority_host.clone(),
        credentials.tenant_id,
        credentials.client_id,
        &credentials.private_key_path,
        &credentials.cert_thumbprint,
    )?;
    let tokens = Arc::new(TokenManager::new(
        credentials.tenant_name.clone(),
        Arc::new(credential),
        store.clone(),
    ));
    info!("  Connected {:?} tenant {}", tenant, credentials.tenant_name);
    Ok(SharePointClient::new(
        transport.clone(),
        tokens,
        &config.graph_url,
    ))
}

/// Build a `LibraryRef`, resolving missing site/list ids from the library URL.
async fn resolve_library(
    config: &Config,
    client: &SharePointClient,
    tenant: Tenant,
    args: &LibraryArgs,
) -> anyhow::Result<LibraryRef> {
    let args = config.library_or_default(tenant, args);
    let library_url = args
        .library_url
        .context("--library-url is required for this command")?;

    if let (Some(site_id), Some(list_id)) = (&args.site_id, &args.list_id) {
        return Ok(LibraryRef::new(library_url, site_id, list_id));
    }

    let resolved = client.graph.get_list_and_site_id(&library_url).await?;
    Ok(LibraryRef::new(
        library_url,
        args.site_id.unwrap_or(resolved.site_id),
        args.list_id.unwrap_or(resolved.list_id),
    ))
}

fn drive_item(item: &ItemArgs) -> DriveItemRef {
    let drive_item = DriveItemRef::new(&item.drive_id, &item.item_id);
    match &item.version {
        Some(version) => drive_item.with_version(version),
        None => drive_item,
    }
}

fn local_file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("cannot derive a file name from {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

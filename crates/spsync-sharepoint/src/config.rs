use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::transport::TransportConfig;

/// Configuration for the spsync CLI.
#[derive(Parser, Debug, Clone)]
#[command(name = "spsync")]
#[command(about = "Reconcile SharePoint list columns, views and formatters, and transfer files between tenants")]
pub struct Config {
    /// Graph API base URL
    #[arg(long, default_value = "https://graph.microsoft.com", env = "GRAPH_URL")]
    pub graph_url: String,

    /// Identity platform authority host
    #[arg(long, default_value = "https://login.microsoftonline.com", env = "AUTHORITY_HOST")]
    pub authority_host: String,

    #[command(flatten)]
    pub source: SourceTenantArgs,

    #[command(flatten)]
    pub destination: DestinationTenantArgs,

    /// File extensions downloaded as PDF by the transfer command
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "csv,doc,docx,odp,ods,odt,pot,potm,potx,pps,ppsx,ppsxm,ppt,pptm,pptx,rtf,xls,xlsx",
        env = "CONVERT_TO_PDF_EXTENSIONS"
    )]
    pub convert_to_pdf_extensions: Vec<String>,

    /// Timeout for API calls (seconds)
    #[arg(long, default_value = "10", env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Timeout for downloads and upload chunks (seconds)
    #[arg(long, default_value = "600", env = "TRANSFER_TIMEOUT_SECS")]
    pub transfer_timeout_secs: u64,

    /// Idle pooled connections kept per host
    #[arg(long, default_value = "200", env = "MAX_IDLE_CONNECTIONS")]
    pub max_idle_connections: usize,

    /// Default library for upload and transfer
    #[arg(long, env = "DESTINATION_LIBRARY_URL")]
    pub destination_library_url: Option<String>,

    #[arg(long, env = "DESTINATION_SITE_ID")]
    pub destination_site_id: Option<String>,

    #[arg(long, env = "DESTINATION_LIST_ID")]
    pub destination_list_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            transfer_timeout: Duration::from_secs(self.transfer_timeout_secs),
            max_idle_per_host: self.max_idle_connections,
        }
    }

    pub fn credentials(&self, tenant: Tenant) -> anyhow::Result<TenantCredentials> {
        match tenant {
            Tenant::Source => self.source.resolve(),
            Tenant::Destination => self.destination.resolve(),
        }
    }

    /// Fill missing library arguments from the DESTINATION_* defaults.
    pub fn library_or_default(&self, tenant: Tenant, library: &LibraryArgs) -> LibraryArgs {
        if tenant != Tenant::Destination {
            return library.clone();
        }
        LibraryArgs {
            library_url: library
                .library_url
                .clone()
                .or_else(|| self.destination_library_url.clone()),
            site_id: library
                .site_id
                .clone()
                .or_else(|| self.destination_site_id.clone()),
            list_id: library
                .list_id
                .clone()
                .or_else(|| self.destination_list_id.clone()),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tenant {
    Source,
    Destination,
}

/// Resolved certificate credential for one tenant.
#[derive(Debug, Clone)]
pub struct TenantCredentials {
    pub client_id: String,
    pub tenant_id: String,
    pub tenant_name: String,
    pub private_key_path: PathBuf,
    pub cert_thumbprint: String,
}

fn require<T: Clone>(value: &Option<T>, variable: &str) -> anyhow::Result<T> {
    value
        .clone()
        .with_context(|| format!("{variable} is required for this command"))
}

#[derive(Args, Debug, Clone, Default)]
pub struct SourceTenantArgs {
    #[arg(id = "source_client_id", long = "source-client-id", env = "SOURCE_AUTH_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(id = "source_tenant_id", long = "source-tenant-id", env = "SOURCE_AUTH_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Tenant name, as in {name}.sharepoint.com
    #[arg(id = "source_tenant_name", long = "source-tenant-name", env = "SOURCE_AUTH_TENANT_NAME")]
    pub tenant_name: Option<String>,

    /// PEM private key of the app certificate
    #[arg(id = "source_private_key_path", long = "source-private-key-path", env = "SOURCE_AUTH_PRIVATE_KEY_PATH")]
    pub private_key_path: Option<PathBuf>,

    /// SHA-1 thumbprint of the app certificate (hex)
    #[arg(id = "source_cert_thumbprint", long = "source-cert-thumbprint", env = "SOURCE_AUTH_CERT_THUMBPRINT")]
    pub cert_thumbprint: Option<String>,
}

impl SourceTenantArgs {
    fn resolve(&self) -> anyhow::Result<TenantCredentials> {
        Ok(TenantCredentials {
            client_id: require(&self.client_id, "SOURCE_AUTH_CLIENT_ID")?,
            tenant_id: require(&self.tenant_id, "SOURCE_AUTH_TENANT_ID")?,
            tenant_name: require(&self.tenant_name, "SOURCE_AUTH_TENANT_NAME")?,
            private_key_path: require(&self.private_key_path, "SOURCE_AUTH_PRIVATE_KEY_PATH")?,
            cert_thumbprint: require(&self.cert_thumbprint, "SOURCE_AUTH_CERT_THUMBPRINT")?,
        })
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct DestinationTenantArgs {
    #[arg(id = "destination_client_id", long = "destination-client-id", env = "DESTINATION_AUTH_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(id = "destination_tenant_id", long = "destination-tenant-id", env = "DESTINATION_AUTH_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Tenant name, as in {name}.sharepoint.com
    #[arg(id = "destination_tenant_name", long = "destination-tenant-name", env = "DESTINATION_AUTH_TENANT_NAME")]
    pub tenant_name: Option<String>,

    /// PEM private key of the app certificate
    #[arg(id = "destination_private_key_path", long = "destination-private-key-path", env = "DESTINATION_AUTH_PRIVATE_KEY_PATH")]
    pub private_key_path: Option<PathBuf>,

    /// SHA-1 thumbprint of the app certificate (hex)
    #[arg(id = "destination_cert_thumbprint", long = "destination-cert-thumbprint", env = "DESTINATION_AUTH_CERT_THUMBPRINT")]
    pub cert_thumbprint: Option<String>,
}

impl DestinationTenantArgs {
    fn resolve(&self) -> anyhow::Result<TenantCredentials> {
        Ok(TenantCredentials {
            client_id: require(&self.client_id, "DESTINATION_AUTH_CLIENT_ID")?,
            tenant_id: require(&self.tenant_id, "DESTINATION_AUTH_TENANT_ID")?,
            tenant_name: require(&self.tenant_name, "DESTINATION_AUTH_TENANT_NAME")?,
            private_key_path: require(
                &self.private_key_path,
                "DESTINATION_AUTH_PRIVATE_KEY_PATH",
            )?,
            cert_thumbprint: require(&self.cert_thumbprint, "DESTINATION_AUTH_CERT_THUMBPRINT")?,
        })
    }
}

/// Addresses a list. Site and list ids are resolved from the URL when omitted.
#[derive(Args, Debug, Clone, Default)]
pub struct LibraryArgs {
    /// Library web URL, https://{tenant}.sharepoint.com/sites/{site}/{library}
    #[arg(long)]
    pub library_url: Option<String>,

    #[arg(long)]
    pub site_id: Option<String>,

    #[arg(long)]
    pub list_id: Option<String>,
}

/// A drive item to read from.
#[derive(Args, Debug, Clone)]
pub struct ItemArgs {
    #[arg(long)]
    pub drive_id: String,

    #[arg(long)]
    pub item_id: String,

    /// Version label to read instead of the current version
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create missing columns and fix drifted ones from a JSON column declaration file
    Columns {
        #[arg(long, value_enum, default_value = "destination")]
        tenant: Tenant,
        #[command(flatten)]
        library: LibraryArgs,
        /// JSON array of column definitions
        #[arg(long)]
        definitions: PathBuf,
    },

    /// Ensure a view exists with the declared columns
    View {
        #[arg(long, value_enum, default_value = "destination")]
        tenant: Tenant,
        #[command(flatten)]
        library: LibraryArgs,
        /// JSON view declaration
        #[arg(long)]
        spec: PathBuf,
    },

    /// Delete a view by title
    RemoveView {
        #[arg(long, value_enum, default_value = "destination")]
        tenant: Tenant,
        #[command(flatten)]
        library: LibraryArgs,
        #[arg(long)]
        title: String,
    },

    /// Remove fields from the default view unless it is the protected view
    CleanDefaultView {
        #[arg(long, value_enum, default_value = "destination")]
        tenant: Tenant,
        #[command(flatten)]
        library: LibraryArgs,
        #[arg(long, value_delimiter = ',', required = true)]
        remove_fields: Vec<String>,
        /// Title of the view that must never be cleaned
        #[arg(long)]
        except_title: String,
    },

    /// Set a content type's form formatter from a JSON file
    ContentTypeFormatter {
        #[arg(long, value_enum, default_value = "destination")]
        tenant: Tenant,
        #[command(flatten)]
        library: LibraryArgs,
        #[arg(long)]
        content_type: String,
        #[arg(long)]
        formatter: PathBuf,
    },

    /// Print the site and list ids of a library URL
    ResolveList {
        #[arg(long, value_enum, default_value = "source")]
        tenant: Tenant,
        #[arg(long)]
        library_url: String,
    },

    /// Download a file, optionally converted to PDF
    Download {
        #[arg(long, value_enum, default_value = "source")]
        tenant: Tenant,
        #[command(flatten)]
        item: ItemArgs,
        #[arg(long)]
        pdf: bool,
        #[arg(long)]
        output: PathBuf,
    },

    /// Upload a local file to a library
    Upload {
        #[arg(long, value_enum, default_value = "destination")]
        tenant: Tenant,
        #[command(flatten)]
        library: LibraryArgs,
        #[arg(long)]
        file: PathBuf,
        /// Name in the library (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Download from the source tenant and upload to the destination library
    Transfer {
        #[command(flatten)]
        item: ItemArgs,
        /// File name of the source item, used to decide PDF conversion
        #[arg(long)]
        file_name: String,
        #[command(flatten)]
        library: LibraryArgs,
        /// Directory for the intermediate file (defaults to the system temp dir)
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
}

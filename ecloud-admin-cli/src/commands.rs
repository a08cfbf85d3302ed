//! Command handlers
//!
//! Every command opens the store, runs one operation, prints the result as
//! JSON and, for mutations, writes the metadata snapshot back.

use anyhow::{Context, Result};
use ecloud_core::config::CONFIG_FILE;
use ecloud_core::{
    ByteRange, DataProviderProperties, FileUpload, RepresentationSearchParams, Revision,
    StorageBackend, Store, StoreConfig,
};
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::Path;

use crate::{
    Commands, DatasetCommand, FileCommand, ProviderCommand, RecordCommand, RepresentationCommand,
    RevisionCommand,
};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Config of an existing store directory
fn store_config(dir: &Path) -> Result<StoreConfig> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        anyhow::bail!(
            "{:?} is not an initialized store (run `ecloud-admin --store {} init`)",
            dir,
            dir.display()
        );
    }
    StoreConfig::load(&path).with_context(|| format!("Failed to read {:?}", path))
}

pub async fn run(dir: &Path, command: Commands) -> Result<()> {
    if let Commands::Init = command {
        return init(dir).await;
    }

    let store = Store::open(store_config(dir)?).await?;
    let mutated = match command {
        Commands::Init => false,
        Commands::Provider(cmd) => provider(&store, cmd).await?,
        Commands::Representation(cmd) => representation(&store, cmd).await?,
        Commands::File(cmd) => file(&store, cmd).await?,
        Commands::Revision(cmd) => revision(&store, cmd).await?,
        Commands::Record(cmd) => record(&store, cmd).await?,
        Commands::Dataset(cmd) => dataset(&store, cmd).await?,
        Commands::Search {
            provider,
            data_set,
            name,
            from,
            to,
            persistent,
            start_from,
            limit,
        } => {
            let params = RepresentationSearchParams {
                data_provider: provider,
                data_set,
                representation_name: name,
                from_date: from,
                to_date: to,
                persistent,
            };
            let found = store
                .service()
                .search(&params, start_from.as_deref(), limit)
                .await?;
            print_json(&found)?;
            false
        }
    };

    if mutated {
        store.save_snapshot().await.context("Failed to save metadata snapshot")?;
    }
    Ok(())
}

async fn init(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        anyhow::bail!("Store already initialized at {:?}", dir);
    }
    let config = StoreConfig::for_directory(dir);
    config.save(&path)?;
    let store = Store::open(config).await?;
    store.save_snapshot().await?;
    tracing::info!("Initialized store at {:?}", dir);
    print_json(&json!({ "initialized": dir }))
}

async fn provider(store: &Store, cmd: ProviderCommand) -> Result<bool> {
    let providers = store.service().providers();
    match cmd {
        ProviderCommand::Create {
            id,
            organisation_name,
            contact_person,
            remarks,
        } => {
            let properties = DataProviderProperties {
                organisation_name,
                contact_person,
                remarks,
                ..Default::default()
            };
            print_json(&providers.create(&id, properties).await?)?;
            Ok(true)
        }
        ProviderCommand::Show { id } => {
            print_json(&providers.get(&id).await?)?;
            Ok(false)
        }
        ProviderCommand::List { start_from, limit } => {
            print_json(&providers.list(start_from.as_deref(), limit).await?)?;
            Ok(false)
        }
        ProviderCommand::Delete { id } => {
            store.service().delete_provider(&id).await?;
            print_json(&json!({ "deleted": id }))?;
            Ok(true)
        }
    }
}

async fn representation(store: &Store, cmd: RepresentationCommand) -> Result<bool> {
    let service = store.service();
    match cmd {
        RepresentationCommand::Create {
            cloud_id,
            name,
            provider,
        } => {
            print_json(&service.create_representation(&cloud_id, &name, &provider).await?)?;
            Ok(true)
        }
        RepresentationCommand::Show {
            cloud_id,
            name,
            version,
        } => {
            print_json(&service.get_representation(&cloud_id, &name, version.as_ref()).await?)?;
            Ok(false)
        }
        RepresentationCommand::Versions { cloud_id, name } => {
            print_json(&service.list_versions(&cloud_id, &name).await?)?;
            Ok(false)
        }
        RepresentationCommand::Persist {
            cloud_id,
            name,
            version,
        } => {
            print_json(&service.persist(&cloud_id, &name, &version).await?)?;
            Ok(true)
        }
        RepresentationCommand::Copy {
            cloud_id,
            name,
            version,
        } => {
            print_json(&service.copy_representation(&cloud_id, &name, &version).await?)?;
            Ok(true)
        }
        RepresentationCommand::Delete {
            cloud_id,
            name,
            version,
        } => {
            match version {
                Some(version) => service.delete_version(&cloud_id, &name, &version).await?,
                None => service.delete_representation(&cloud_id, &name).await?,
            }
            print_json(&json!({ "deleted": format!("{}/{}", cloud_id, name), "version": version }))?;
            Ok(true)
        }
    }
}

async fn file(store: &Store, cmd: FileCommand) -> Result<bool> {
    let service = store.service();
    match cmd {
        FileCommand::Upload {
            cloud_id,
            name,
            version,
            path,
            file_name,
            mime_type,
            md5,
            database,
        } => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {:?}", path))?;
            let file_name = file_name.or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            });
            let upload = FileUpload {
                file_name,
                mime_type,
                storage: if database {
                    StorageBackend::Database
                } else {
                    StorageBackend::Object
                },
                expected_md5: md5,
                data: bytes::Bytes::from(data),
            };
            let stored = service.put_content(&cloud_id, &name, &version, upload).await?;
            print_json(&json!({
                "created": stored.created,
                "file": stored.file,
                "representation": stored.representation,
            }))?;
            Ok(true)
        }
        FileCommand::Download {
            cloud_id,
            name,
            version,
            file_name,
            output,
            range,
        } => {
            let range = match range {
                Some(header) => ByteRange::parse(&header)?,
                None => ByteRange::full(),
            };
            let data = service
                .get_content(&cloud_id, &name, &version, &file_name, range)
                .await?;
            match output {
                Some(path) => tokio::fs::write(&path, &data)
                    .await
                    .with_context(|| format!("Failed to write {:?}", path))?,
                None => std::io::stdout().write_all(&data)?,
            }
            Ok(false)
        }
        FileCommand::Delete {
            cloud_id,
            name,
            version,
            file_name,
        } => {
            print_json(&service.delete_content(&cloud_id, &name, &version, &file_name).await?)?;
            Ok(true)
        }
    }
}

async fn revision(store: &Store, cmd: RevisionCommand) -> Result<bool> {
    let service = store.service();
    match cmd {
        RevisionCommand::Add {
            cloud_id,
            name,
            version,
            revision_provider,
            revision_name,
            deleted,
        } => {
            let mut revision = Revision::new(revision_name, revision_provider);
            if deleted {
                revision = revision.mark_deleted();
            }
            print_json(&service.add_revision(&cloud_id, &name, &version, revision).await?)?;
            Ok(true)
        }
        RevisionCommand::Show {
            cloud_id,
            name,
            version,
            revision_key,
        } => {
            print_json(&service.get_revision(&cloud_id, &name, &version, &revision_key).await?)?;
            Ok(false)
        }
        RevisionCommand::Delete {
            cloud_id,
            name,
            version,
            revision_provider,
            revision_name,
            timestamp,
        } => {
            service
                .delete_revision(&cloud_id, &name, &version, &revision_name, &revision_provider, timestamp)
                .await?;
            print_json(&json!({ "deleted": format!("{}_{}", revision_provider, revision_name) }))?;
            Ok(true)
        }
        RevisionCommand::Find {
            cloud_id,
            name,
            revision_provider,
            revision_name,
            timestamp,
        } => {
            let found = service
                .get_representation_revision(&cloud_id, &name, &revision_provider, &revision_name, timestamp)
                .await?;
            print_json(&found)?;
            Ok(false)
        }
    }
}

async fn record(store: &Store, cmd: RecordCommand) -> Result<bool> {
    let service = store.service();
    match cmd {
        RecordCommand::Show { cloud_id } => {
            print_json(&service.get_record(&cloud_id).await?)?;
            Ok(false)
        }
        RecordCommand::Delete { cloud_id } => {
            service.delete_record(&cloud_id).await?;
            print_json(&json!({ "deleted": cloud_id }))?;
            Ok(true)
        }
    }
}

async fn dataset(store: &Store, cmd: DatasetCommand) -> Result<bool> {
    let service = store.service();
    let data_sets = service.data_sets();
    match cmd {
        DatasetCommand::Create {
            provider,
            id,
            description,
        } => {
            print_json(&data_sets.create_data_set(&provider, &id, description.as_deref()).await?)?;
            Ok(true)
        }
        DatasetCommand::Assign {
            provider,
            id,
            cloud_id,
            name,
            version,
        } => {
            data_sets
                .add_assignment(&provider, &id, &cloud_id, &name, version.as_ref())
                .await?;
            print_json(&json!({ "assigned": format!("{}/{}", cloud_id, name), "version": version }))?;
            Ok(true)
        }
        DatasetCommand::Unassign {
            provider,
            id,
            cloud_id,
            name,
        } => {
            data_sets.remove_assignment(&provider, &id, &cloud_id, &name).await?;
            print_json(&json!({ "unassigned": format!("{}/{}", cloud_id, name) }))?;
            Ok(true)
        }
        DatasetCommand::List {
            provider,
            id,
            start_from,
            limit,
        } => {
            print_json(&service.list_data_set(&provider, &id, start_from.as_deref(), limit).await?)?;
            Ok(false)
        }
        DatasetCommand::Delete { provider, id } => {
            data_sets.delete_data_set(&provider, &id).await?;
            print_json(&json!({ "deleted": format!("{}/{}", provider, id) }))?;
            Ok(true)
        }
    }
}

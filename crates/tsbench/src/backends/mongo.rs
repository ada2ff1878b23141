//! MongoDB document store backend.
//!
//! Requires a running MongoDB instance. Enable with `--features mongodb`.

use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, Credential, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use tokio::runtime::Runtime;

use crate::config::BackendSpec;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::size::bytes_to_kb;

use super::{Backend, BackendKind, START_TIME_INDEX, TABLE_NAME};

/// Upserts per `update` command in a bulk write.
const BULK_CHUNK_SIZE: usize = 10_000;

/// Name of the unique natural-key index.
const NATURAL_KEY_INDEX: &str = "uniq_natural_key";

/// MongoDB backend for benchmarks.
pub struct MongoBackend {
    name: String,
    client: Option<Client>,
    database: String,
    rt: Runtime,
}

impl MongoBackend {
    /// Connect and ping the server.
    pub fn connect(spec: &BackendSpec) -> Result<Self> {
        let rt = Runtime::new()?;
        let params = &spec.params;
        let uri = format!("mongodb://{}:{}", params.host, params.port);

        let client = rt
            .block_on(async {
                let mut options = ClientOptions::parse(&uri).await?;
                if params.has_credentials() {
                    options.credential = Some(
                        Credential::builder()
                            .username(params.username.clone())
                            .password(params.password.clone())
                            .source("admin".to_string())
                            .build(),
                    );
                }
                options.max_pool_size = Some(spec.mongo_pool_size);
                options.app_name = Some("tsbench".to_string());

                let client = Client::with_options(options)?;
                client
                    .database("admin")
                    .run_command(doc! { "ping": 1 })
                    .await?;
                Ok::<_, mongodb::error::Error>(client)
            })
            .map_err(|e| Error::Connection {
                backend: spec.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: spec.name.clone(),
            client: Some(client),
            database: params.database.clone(),
            rt,
        })
    }

    fn session(&self) -> Result<(&Runtime, Database)> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::Closed(self.name.clone()))?;
        Ok((&self.rt, client.database(&self.database)))
    }
}

fn filter(record: &Record) -> Document {
    doc! {
        "start_time": bson::DateTime::from_chrono(record.start_time),
        "interval_ms": record.interval_ms,
        "area": record.area.as_str(),
    }
}

/// `$set` the mutable fields and keep `created_at` from the first insert.
fn update(record: &Record) -> Document {
    doc! {
        "$set": {
            "updated_at": bson::DateTime::from_chrono(record.updated_at),
            "source": record.source.as_str(),
            "value": record.value,
        },
        "$setOnInsert": {
            "created_at": bson::DateTime::from_chrono(record.created_at),
        },
    }
}

fn document_to_record(doc: &Document) -> Result<Record> {
    Ok(Record {
        created_at: doc.get_datetime("created_at")?.to_chrono(),
        updated_at: doc.get_datetime("updated_at")?.to_chrono(),
        start_time: doc.get_datetime("start_time")?.to_chrono(),
        interval_ms: doc.get_i64("interval_ms")?,
        area: doc.get_str("area")?.to_string(),
        source: doc.get_str("source")?.to_string(),
        value: doc.get_f64("value")?,
    })
}

/// First write error or the write concern error of a command reply, if any.
fn write_failure(reply: &Document) -> Option<String> {
    let failure = reply
        .get_array("writeErrors")
        .ok()
        .and_then(|errors| errors.first())
        .and_then(Bson::as_document)
        .or_else(|| reply.get_document("writeConcernError").ok())?;
    Some(
        failure
            .get_str("errmsg")
            .map(str::to_string)
            .unwrap_or_else(|_| failure.to_string()),
    )
}

fn size_bytes(stats: &Document) -> i64 {
    match stats.get("totalSize") {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) => *n as i64,
        _ => 0,
    }
}

impl Backend for MongoBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::MongoDb
    }

    fn setup(&mut self) -> Result<()> {
        let (rt, db) = self.session()?;
        let coll: Collection<Document> = db.collection(TABLE_NAME);

        rt.block_on(async {
            coll.drop().await?;

            let natural_key = IndexModel::builder()
                .keys(doc! { "start_time": -1, "interval_ms": -1, "area": -1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name(NATURAL_KEY_INDEX.to_string())
                        .build(),
                )
                .build();
            coll.create_index(natural_key).await?;

            let start_time = IndexModel::builder()
                .keys(doc! { "start_time": -1 })
                .options(
                    IndexOptions::builder()
                        .name(START_TIME_INDEX.to_string())
                        .build(),
                )
                .build();
            coll.create_index(start_time).await?;

            Ok(())
        })
    }

    fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            self.rt.block_on(async { client.shutdown().await });
        }
        Ok(())
    }

    fn upsert_single(&mut self, records: &[Record]) -> Result<()> {
        let (rt, db) = self.session()?;
        let coll: Collection<Document> = db.collection(TABLE_NAME);

        rt.block_on(async {
            for record in records {
                coll.update_one(filter(record), update(record))
                    .upsert(true)
                    .await?;
            }
            Ok(())
        })
    }

    fn upsert_bulk(&mut self, records: &[Record]) -> Result<()> {
        let (rt, db) = self.session()?;

        rt.block_on(async {
            for chunk in records.chunks(BULK_CHUNK_SIZE) {
                let updates: Vec<Document> = chunk
                    .iter()
                    .map(|record| {
                        doc! {
                            "q": filter(record),
                            "u": update(record),
                            "upsert": true,
                        }
                    })
                    .collect();

                let reply = db
                    .run_command(doc! {
                        "update": TABLE_NAME,
                        "updates": updates,
                        "ordered": true,
                    })
                    .await?;

                if let Some(message) = write_failure(&reply) {
                    return Err(Error::Write(message));
                }
            }
            Ok(())
        })
    }

    fn get_ordered_with_limit(&mut self, limit: usize) -> Result<Vec<Record>> {
        let (rt, db) = self.session()?;
        let coll: Collection<Document> = db.collection(TABLE_NAME);

        rt.block_on(async {
            let docs: Vec<Document> = coll
                .find(doc! {})
                .sort(doc! { "start_time": -1 })
                .limit(limit as i64)
                .await?
                .try_collect()
                .await?;
            docs.iter().map(document_to_record).collect()
        })
    }

    fn table_size_kb(&mut self) -> Result<u64> {
        let (rt, db) = self.session()?;

        rt.block_on(async {
            let stats = db.run_command(doc! { "collStats": TABLE_NAME }).await?;
            Ok(bytes_to_kb(size_bytes(&stats)))
        })
    }
}

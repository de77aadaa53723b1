/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::sync::Arc;
use std::time::Duration;

use changeengine::ChangeEngine;
use clap::Parser;
use gc::{spawn_daily_trigger, GarbageCollector, GcLock};
use metastore::MetaStore;
use objectstore::{FsObjectStore, ObjectStore};
use pogo_rpc::{PogoHandler, PogoServer};
use slog::{info, o, Drain};

mod auth;
mod ci_tokens;
mod config;

use auth::ServerAuth;
use ci_tokens::{spawn_sweeper, CiTokenStore};
use config::Config;

fn build_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    let logger = build_logger();

    let meta = Arc::new(MetaStore::open(&config.database_url).await?);
    let objects: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(config.data_root.clone()));
    let engine = Arc::new(ChangeEngine::new(
        meta.clone(),
        objects.clone(),
        logger.new(o!("component" => "changeengine")),
    ));

    let gc_lock = GcLock::new();
    let mut gc = GarbageCollector::new(
        meta.clone(),
        objects.clone(),
        gc_lock.clone(),
        logger.new(o!("component" => "gc")),
    );
    if let Some(threshold) = config.gc_memory_threshold {
        gc = gc.with_gc_memory_threshold(threshold);
    }
    if let Some(hours) = config.ci_run_retention_hours {
        gc = gc.with_ci_run_retention_hours(hours);
    }
    let gc = Arc::new(gc);

    // Daily sweep in addition to the explicit `GarbageCollect` RPC (spec
    // §4.5.3); 02:00 local keeps it off peak hours without needing a
    // configuration knob the spec doesn't call for.
    let gc_trigger_at = chrono::NaiveTime::from_hms_opt(2, 0, 0).unwrap();
    let _gc_trigger = spawn_daily_trigger(gc.clone(), gc_trigger_at, logger.new(o!("component" => "gc-trigger")));

    let ci_tokens = Arc::new(CiTokenStore::new(Duration::from_secs(
        config.ci_token_ttl_seconds,
    )));
    let _ci_sweeper = spawn_sweeper(
        ci_tokens.clone(),
        Duration::from_secs(60),
        logger.new(o!("component" => "ci-tokens")),
    );

    let auth = Arc::new(ServerAuth::new(
        meta.clone(),
        config.root_token.clone(),
        ci_tokens,
    ));

    let handler = PogoHandler::new(
        engine,
        meta,
        gc,
        gc_lock,
        auth,
        logger.new(o!("component" => "rpc")),
    );

    let listen_address = format!("{}:{}", config.host, config.port).parse()?;
    info!(logger, "pogo-server listening"; "address" => %listen_address, "public_address" => %config.public_address);

    tonic::transport::Server::builder()
        .add_service(PogoServer::new(handler))
        .serve(listen_address)
        .await?;

    Ok(())
}

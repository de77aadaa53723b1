/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::io::Result;

fn main() -> Result<()> {
    // https://github.com/hyperium/tonic/issues/908 -- route message bytes
    // fields through `bytes::Bytes` instead of `Vec<u8>` so large file
    // content chunks aren't copied an extra time going in and out of prost.
    let mut config = prost_build::Config::new();
    config.bytes(["."]);

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_with_config(config, &["proto/pogo.proto"], &["proto"])?;
    Ok(())
}

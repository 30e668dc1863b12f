//! Lists the names in a directory on a public test FTP server.
//!
//! Run with `cargo run --example list-names`.

use ftp_client::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let config = SessionConfigBuilder::new("test.rebex.net")
        .credentials("demo", "password")
        .build();
    let mut session = Session::connect(config).await?;

    for entry in session.ls("/").await? {
        println!("{}", entry.name);
    }

    session.destroy().await;
    Ok(())
}

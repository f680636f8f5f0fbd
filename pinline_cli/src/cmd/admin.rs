use anyhow::Result;
use pinline_backend_redb::RedbStore;
use tracing::info;

use crate::{NetworkCmd, UserCmd};

pub async fn run_user(cmd: UserCmd, db: &RedbStore) -> Result<()> {
    match cmd {
        UserCmd::Add { username, email } => {
            db.put_user(&username, &email).await?;
            info!(user = %username, "user saved");
        }
        UserCmd::Keys { username } => {
            for (name, peer_id) in db.user_keys(&username).await? {
                println!("{name}\t{peer_id}");
            }
        }
        UserCmd::Credits { username } => {
            println!("{}", db.balance(&username).await?);
        }
    }
    Ok(())
}

pub async fn run_network(cmd: NetworkCmd, db: &RedbStore) -> Result<()> {
    match cmd {
        NetworkCmd::Add {
            name,
            api_url,
            members,
        } => {
            db.put_network(&name, &api_url, &members).await?;
            info!(network = %name, members = members.len(), "network saved");
        }
    }
    Ok(())
}

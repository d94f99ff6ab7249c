use anyhow::Result;
use mongodb::{bson::doc, options::IndexOptions, IndexModel};

use crate::mongodb::{
    MongoDatabase, COMPLAINTS, DEFINITIONS, INSTANCES, NOTIFICATIONS, USERS,
};

fn unique(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn plain(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

/// Creates the indexes the stores rely on. Idempotent.
pub async fn ensure_indexes(database: &MongoDatabase) -> Result<()> {
    tracing::info!("Ensuring MongoDB indexes");

    let plan = [
        (DEFINITIONS, unique(doc! { "id": 1 })),
        (DEFINITIONS, plain(doc! { "organization_id": 1, "complaint_type_id": 1, "is_active": 1 })),
        (INSTANCES, unique(doc! { "id": 1 })),
        // One workflow instance per complaint.
        (INSTANCES, unique(doc! { "complaint_id": 1 })),
        (INSTANCES, plain(doc! { "workflow_id": 1, "is_completed": 1 })),
        (COMPLAINTS, unique(doc! { "id": 1 })),
        (COMPLAINTS, plain(doc! { "assigned_to": 1, "status": 1 })),
        (USERS, unique(doc! { "id": 1 })),
        (USERS, unique(doc! { "email": 1 })),
        (USERS, plain(doc! { "api_token_digest": 1 })),
        (NOTIFICATIONS, unique(doc! { "id": 1 })),
        (NOTIFICATIONS, plain(doc! { "user_id": 1, "created_at": -1 })),
    ];

    for (collection, index) in plan {
        database
            .collection::<mongodb::bson::Document>(collection)
            .create_index(index, None)
            .await?;
    }

    tracing::info!("MongoDB indexes ready");
    Ok(())
}

use mongodb::{
    bson::{doc, oid::ObjectId, to_bson},
    options::ReturnDocument,
    Client, Collection, Database,
};

use super::models::{Account, AccountingConnection, Counter, Donation, Receipt, SubscriptionStatus};
use crate::error::{ApiError, Result};

#[derive(Clone)]
pub struct MongoDbContext {
    db: Database,
}

impl MongoDbContext {
    pub fn new(client: Client, database_name: &str) -> Self {
        Self {
            db: client.database(database_name),
        }
    }

    pub fn accounts(&self) -> AccountRepository {
        AccountRepository {
            collection: self.db.collection("accounts"),
        }
    }

    pub fn donations(&self) -> DonationRepository {
        DonationRepository {
            collection: self.db.collection("donations"),
        }
    }

    pub fn receipts(&self) -> ReceiptRepository {
        ReceiptRepository {
            collection: self.db.collection("receipts"),
        }
    }

    pub fn counters(&self) -> CounterRepository {
        CounterRepository {
            collection: self.db.collection("counters"),
        }
    }

    pub async fn init_indexes(&self) -> Result<()> {
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        // Unique index on account email
        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.db
            .collection::<Account>("accounts")
            .create_index(email_index)
            .await?;

        // Donation numbers are unique per account
        let donation_number_index = IndexModel::builder()
            .keys(doc! { "account_id": 1, "number": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.db
            .collection::<Donation>("donations")
            .create_index(donation_number_index)
            .await?;

        // Import dedup lookups
        let donation_source_index = IndexModel::builder()
            .keys(doc! { "account_id": 1, "source_ref": 1 })
            .build();

        self.db
            .collection::<Donation>("donations")
            .create_index(donation_source_index)
            .await?;

        // Receipt numbers are unique per account
        let receipt_number_index = IndexModel::builder()
            .keys(doc! { "account_id": 1, "number": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.db
            .collection::<Receipt>("receipts")
            .create_index(receipt_number_index)
            .await?;

        // One counter document per (account, kind)
        let counter_index = IndexModel::builder()
            .keys(doc! { "account_id": 1, "kind": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.db
            .collection::<Counter>("counters")
            .create_index(counter_index)
            .await?;

        log::info!("Database indexes created successfully");
        Ok(())
    }
}

#[derive(Clone)]
pub struct AccountRepository {
    collection: Collection<Account>,
}

impl AccountRepository {
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let account = self.collection.find_one(doc! { "email": email }).await?;
        Ok(account)
    }

    pub async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Account>> {
        let account = self.collection.find_one(doc! { "_id": id }).await?;
        Ok(account)
    }

    pub async fn insert(&self, account: &Account) -> Result<ObjectId> {
        let result = self.collection.insert_one(account).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| ApiError::Internal("inserted account has no ObjectId".to_string()))
    }

    pub async fn update_last_login(&self, id: &ObjectId) -> Result<()> {
        let now = to_bson(&chrono::Utc::now())?;
        self.collection
            .update_one(doc! { "_id": id }, doc! { "$set": { "last_login": now } })
            .await?;
        Ok(())
    }

    pub async fn set_subscription(&self, id: &ObjectId, status: SubscriptionStatus) -> Result<()> {
        let status = to_bson(&status)?;
        self.collection
            .update_one(doc! { "_id": id }, doc! { "$set": { "subscription": status } })
            .await?;
        Ok(())
    }

    pub async fn set_accounting(
        &self,
        id: &ObjectId,
        connection: Option<&AccountingConnection>,
    ) -> Result<()> {
        let update = match connection {
            Some(connection) => doc! { "$set": { "accounting": to_bson(connection)? } },
            None => doc! { "$unset": { "accounting": "" } },
        };
        self.collection.update_one(doc! { "_id": id }, update).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct DonationRepository {
    collection: Collection<Donation>,
}

impl DonationRepository {
    pub async fn find_by_account(&self, account_id: &ObjectId) -> Result<Vec<Donation>> {
        let mut cursor = self
            .collection
            .find(doc! { "account_id": account_id })
            .sort(doc! { "number": 1 })
            .await?;

        let mut donations = Vec::new();
        use futures_util::stream::TryStreamExt;
        while let Some(donation) = cursor.try_next().await? {
            donations.push(donation);
        }

        Ok(donations)
    }

    pub async fn find_by_account_and_numbers(
        &self,
        account_id: &ObjectId,
        numbers: &[i64],
    ) -> Result<Vec<Donation>> {
        let mut cursor = self
            .collection
            .find(doc! { "account_id": account_id, "number": { "$in": numbers.to_vec() } })
            .sort(doc! { "number": 1 })
            .await?;

        let mut donations = Vec::new();
        use futures_util::stream::TryStreamExt;
        while let Some(donation) = cursor.try_next().await? {
            donations.push(donation);
        }

        Ok(donations)
    }

    pub async fn source_ref_exists(&self, account_id: &ObjectId, source_ref: &str) -> Result<bool> {
        let existing = self
            .collection
            .find_one(doc! { "account_id": account_id, "source_ref": source_ref })
            .await?;
        Ok(existing.is_some())
    }

    pub async fn insert(&self, donation: &Donation) -> Result<()> {
        self.collection.insert_one(donation).await?;
        Ok(())
    }

    pub async fn mark_receipted(&self, account_id: &ObjectId, numbers: &[i64]) -> Result<()> {
        self.collection
            .update_many(
                doc! { "account_id": account_id, "number": { "$in": numbers.to_vec() } },
                doc! { "$set": { "receipted": true } },
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ReceiptRepository {
    collection: Collection<Receipt>,
}

impl ReceiptRepository {
    pub async fn find_by_account(&self, account_id: &ObjectId) -> Result<Vec<Receipt>> {
        let mut cursor = self
            .collection
            .find(doc! { "account_id": account_id })
            .sort(doc! { "number": -1 })
            .await?;

        let mut receipts = Vec::new();
        use futures_util::stream::TryStreamExt;
        while let Some(receipt) = cursor.try_next().await? {
            receipts.push(receipt);
        }

        Ok(receipts)
    }

    pub async fn insert(&self, receipt: &Receipt) -> Result<()> {
        self.collection.insert_one(receipt).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct CounterRepository {
    collection: Collection<Counter>,
}

impl CounterRepository {
    // Atomically allocate the next value in a per-account sequence.
    pub async fn next(&self, account_id: &ObjectId, kind: &str) -> Result<i64> {
        let counter = self
            .collection
            .find_one_and_update(
                doc! { "account_id": account_id, "kind": kind },
                doc! { "$inc": { "value": 1 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?;

        counter
            .map(|c| c.value)
            .ok_or_else(|| ApiError::Internal("counter allocation returned no document".to_string()))
    }
}

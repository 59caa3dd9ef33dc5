//! Customer accounts and saved addresses (read side).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use haya_core::{AddressId, Email, UserId};

use super::RepositoryError;
use crate::models::{Address, Customer};

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<Customer>, RepositoryError>;

    /// An address, only if it belongs to `user_id`.
    async fn address(
        &self,
        user_id: UserId,
        id: AddressId,
    ) -> Result<Option<Address>, RepositoryError>;

    async fn set_newsletter(&self, id: UserId, subscribed: bool) -> Result<(), RepositoryError>;
}

/// `PostgreSQL` implementation over `customers` and `addresses`.
pub struct PgCustomerRepository {
    pool: PgPool,
}

impl PgCustomerRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: UserId,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    newsletter: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(r: CustomerRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&r.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: r.id,
            email,
            first_name: r.first_name,
            last_name: r.last_name,
            phone: r.phone,
            newsletter: r.newsletter,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: AddressId,
    user_id: UserId,
    first_name: String,
    last_name: String,
    street: String,
    city: String,
    postal_code: String,
    country: String,
    phone: Option<String>,
}

impl From<AddressRow> for Address {
    fn from(r: AddressRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            first_name: r.first_name,
            last_name: r.last_name,
            street: r.street,
            city: r.city,
            postal_code: r.postal_code,
            country: r.country,
            phone: r.phone,
        }
    }
}

#[async_trait]
impl CustomerRepository for PgCustomerRepository {
    async fn get(&self, id: UserId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r"
            SELECT id, email, first_name, last_name, phone, newsletter, created_at
            FROM customers
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Customer::try_from).transpose()
    }

    async fn address(
        &self,
        user_id: UserId,
        id: AddressId,
    ) -> Result<Option<Address>, RepositoryError> {
        let row = sqlx::query_as::<_, AddressRow>(
            r"
            SELECT id, user_id, first_name, last_name, street, city, postal_code, country, phone
            FROM addresses
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Address::from))
    }

    async fn set_newsletter(&self, id: UserId, subscribed: bool) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE customers SET newsletter = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(subscribed)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

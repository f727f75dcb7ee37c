use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Page, Paged, Store, StoreError, StoreResult};
use crate::auth::repo_types::{NewUser, ResetToken, User, UserRow};
use crate::business::repo_types::{
    Business, BusinessDraft, BusinessFilter, BusinessRow, NewBusiness,
};
use crate::reports::repo_types::{
    NewReport, Period, Report, ReportFilter, ReportPatch, ReportRow, DEFAULT_DATE_LIMIT,
};

const USER_COLUMNS: &str = "id, email, password_hash, role, business_id, \
     reset_password_token, reset_password_expire, created_at";

const BUSINESS_SELECT: &str = r#"
    SELECT b.id, b.tax_id, b.business_name, b.user_id, b.created_at,
           ARRAY(SELECT r.id FROM reports r WHERE r.business_id = b.id ORDER BY r.seq) AS reports
      FROM businesses b
"#;

const REPORT_COLUMNS: &str =
    "id, business_id, period_year, period_month, date_limit, date_added, products_list";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")
    }
}

/// Map SQLx errors to StoreError, keeping the violated constraint name.
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => {
                return StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                }
            }
            Some("23503") => return StoreError::MissingReference("row"),
            _ => {}
        }
    }
    StoreError::Backend(anyhow::Error::new(err).context(operation))
}

fn user_from_row(row: UserRow) -> StoreResult<User> {
    User::try_from(row).map_err(StoreError::Backend)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user_with_business(
        &self,
        new: NewUser,
        business: Option<BusinessDraft>,
    ) -> StoreResult<(User, Option<Business>)> {
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin tx", e))?;

        let mut row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, email, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert user", e))?;

        let mut created = None;
        if let Some(draft) = business {
            let business = sqlx::query_as::<_, BusinessRow>(
                r#"
                INSERT INTO businesses (id, tax_id, business_name, user_id)
                VALUES ($1, $2, $3, $4)
                RETURNING id, tax_id, business_name, user_id, created_at, '{}'::uuid[] AS reports
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&draft.tax_id)
            .bind(&draft.business_name)
            .bind(row.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert business", e))?;

            row = sqlx::query_as::<_, UserRow>(&format!(
                "UPDATE users SET business_id = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
            ))
            .bind(row.id)
            .bind(business.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("link user to business", e))?;
            created = Some(Business::from(business));
        }

        // Dropping `tx` on any earlier return rolls both inserts back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit tx", e))?;
        Ok((user_from_row(row)?, created))
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx_error("find user by id", e))?;
        row.map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx_error("find user by email", e))?;
        row.map(user_from_row).transpose()
    }

    async fn set_reset_token(&self, user_id: Uuid, token: Option<ResetToken>) -> StoreResult<()> {
        let (hash, expires) = match token {
            Some(t) => (Some(t.token_hash), Some(t.expires_at)),
            None => (None, None),
        };
        let done = sqlx::query(
            r#"
            UPDATE users
               SET reset_password_token = $2, reset_password_expire = $3
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(hash)
        .bind(expires)
        .execute(&self.db)
        .await
        .map_err(|e| map_sqlx_error("set reset token", e))?;
        if done.rows_affected() == 0 {
            return Err(StoreError::MissingReference("user"));
        }
        Ok(())
    }

    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users
              WHERE reset_password_token = $1 AND reset_password_expire > $2"
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx_error("find user by reset token", e))?;
        row.map(user_from_row).transpose()
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users
                SET password_hash = $2, reset_password_token = NULL, reset_password_expire = NULL
              WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx_error("update password", e))?
        .ok_or(StoreError::MissingReference("user"))?;
        user_from_row(row)
    }

    async fn insert_business(&self, new: NewBusiness) -> StoreResult<Business> {
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin tx", e))?;

        let row = sqlx::query_as::<_, BusinessRow>(
            r#"
            INSERT INTO businesses (id, tax_id, business_name, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, tax_id, business_name, user_id, created_at, '{}'::uuid[] AS reports
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.tax_id)
        .bind(&new.business_name)
        .bind(new.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert business", e))?;

        sqlx::query("UPDATE users SET business_id = $2 WHERE id = $1")
            .bind(new.user_id)
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("link user to business", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit tx", e))?;
        Ok(row.into())
    }

    async fn find_business(&self, id: Uuid) -> StoreResult<Option<Business>> {
        let row = sqlx::query_as::<_, BusinessRow>(&format!("{BUSINESS_SELECT} WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| map_sqlx_error("find business", e))?;
        Ok(row.map(Into::into))
    }

    async fn find_business_by_owner(&self, user_id: Uuid) -> StoreResult<Option<Business>> {
        let row =
            sqlx::query_as::<_, BusinessRow>(&format!("{BUSINESS_SELECT} WHERE b.user_id = $1"))
                .bind(user_id)
                .fetch_optional(&self.db)
                .await
                .map_err(|e| map_sqlx_error("find business by owner", e))?;
        Ok(row.map(Into::into))
    }

    async fn find_business_by_tax_id(&self, tax_id: &str) -> StoreResult<Option<Business>> {
        let row =
            sqlx::query_as::<_, BusinessRow>(&format!("{BUSINESS_SELECT} WHERE b.tax_id = $1"))
                .bind(tax_id)
                .fetch_optional(&self.db)
                .await
                .map_err(|e| map_sqlx_error("find business by tax id", e))?;
        Ok(row.map(Into::into))
    }

    async fn list_businesses(
        &self,
        filter: BusinessFilter,
        page: Page,
    ) -> StoreResult<Paged<Business>> {
        let rows = sqlx::query_as::<_, BusinessRow>(&format!(
            "{BUSINESS_SELECT}
              WHERE ($1::uuid IS NULL OR b.user_id = $1)
              ORDER BY b.created_at DESC, b.id DESC
              LIMIT $2 OFFSET $3"
        ))
        .bind(filter.owner)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db)
        .await
        .map_err(|e| map_sqlx_error("list businesses", e))?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM businesses b WHERE ($1::uuid IS NULL OR b.user_id = $1)",
        )
        .bind(filter.owner)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_sqlx_error("count businesses", e))?;

        Ok(Paged {
            items: rows.into_iter().map(Into::into).collect(),
            total,
        })
    }

    async fn insert_report(&self, new: NewReport) -> StoreResult<Report> {
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin tx", e))?;

        // Serialises report creation per business.
        let owner = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM businesses WHERE id = $1 FOR UPDATE",
        )
        .bind(new.business_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock business", e))?;
        if owner.is_none() {
            return Err(StoreError::MissingReference("business"));
        }

        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "INSERT INTO reports
                 (id, business_id, period_year, period_month, date_limit, date_added, products_list)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {REPORT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.business_id)
        .bind(&new.period.year)
        .bind(&new.period.month)
        .bind(DEFAULT_DATE_LIMIT)
        .bind(OffsetDateTime::now_utc())
        .bind(Json(&new.products_list))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert report", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit tx", e))?;
        Ok(row.into())
    }

    async fn find_report(&self, id: Uuid) -> StoreResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx_error("find report", e))?;
        Ok(row.map(Into::into))
    }

    async fn find_report_by_period(
        &self,
        business_id: Uuid,
        period: &Period,
    ) -> StoreResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports
              WHERE business_id = $1 AND period_year = $2 AND period_month = $3"
        ))
        .bind(business_id)
        .bind(&period.year)
        .bind(&period.month)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx_error("find report by period", e))?;
        Ok(row.map(Into::into))
    }

    async fn list_reports(&self, filter: ReportFilter, page: Page) -> StoreResult<Paged<Report>> {
        const WHERE: &str = "WHERE ($1::uuid IS NULL OR business_id = $1)
                               AND ($2::text IS NULL OR period_year = $2)
                               AND ($3::text IS NULL OR period_month = $3)";

        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports {WHERE}
              ORDER BY seq DESC
              LIMIT $4 OFFSET $5"
        ))
        .bind(filter.business)
        .bind(&filter.year)
        .bind(&filter.month)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db)
        .await
        .map_err(|e| map_sqlx_error("list reports", e))?;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM reports {WHERE}"))
            .bind(filter.business)
            .bind(&filter.year)
            .bind(&filter.month)
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_sqlx_error("count reports", e))?;

        Ok(Paged {
            items: rows.into_iter().map(Into::into).collect(),
            total,
        })
    }

    async fn update_report(&self, id: Uuid, patch: ReportPatch) -> StoreResult<Option<Report>> {
        let (year, month) = match patch.period {
            Some(p) => (Some(p.year), Some(p.month)),
            None => (None, None),
        };
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "UPDATE reports
                SET period_year = COALESCE($2, period_year),
                    period_month = COALESCE($3, period_month),
                    products_list = COALESCE($4, products_list)
              WHERE id = $1
             RETURNING {REPORT_COLUMNS}"
        ))
        .bind(id)
        .bind(year)
        .bind(month)
        .bind(patch.products_list.map(Json))
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_sqlx_error("update report", e))?;
        Ok(row.map(Into::into))
    }

    async fn close(&self) {
        self.db.close().await;
    }
}

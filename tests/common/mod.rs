#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use sqlx::{Connection, MySqlConnection, PgConnection};
use uuid::Uuid;

/// Per-test pair of throwaway databases, one MySQL and one PostgreSQL,
/// created through admin connections taken from the environment.
pub struct TestContext {
    /// Common name of the temporary databases on both servers
    pub db_name: String,
    pub mysql_admin_url: String,
    pub pg_admin_url: String,
    /// Full URL of the temporary MySQL database
    pub mysql_url: String,
    /// Full URL of the temporary PostgreSQL database
    pub pg_url: String,
}

impl TestContext {
    pub async fn setup() -> Self {
        let unique_id = Uuid::new_v4().simple().to_string();
        let db_name = format!("test_db_{unique_id}");

        // URLs come from the environment (set by run_tests.sh)
        let mysql_admin_url = std::env::var("MYSQL_URL_ADMIN").expect("MYSQL_URL_ADMIN is missing");
        let pg_admin_url =
            std::env::var("POSTGRES_URL_ADMIN").expect("POSTGRES_URL_ADMIN is missing");

        let mut mysql_admin = match MySqlConnection::connect(&mysql_admin_url).await {
            Ok(conn) => conn,
            Err(e) => {
                panic!("\n\nMySQL connect (admin) failed!\nURL: {mysql_admin_url}\nError: {e}\n")
            }
        };
        sqlx::query(&format!("CREATE DATABASE {db_name}"))
            .execute(&mut mysql_admin)
            .await
            .expect("Error creating temporary MySQL DB");

        let mut pg_admin = match PgConnection::connect(&pg_admin_url).await {
            Ok(conn) => conn,
            Err(e) => {
                panic!("\n\nPostgres connect (admin) failed!\nURL: {pg_admin_url}\nError: {e}\n")
            }
        };
        sqlx::query(&format!("CREATE DATABASE {db_name}"))
            .execute(&mut pg_admin)
            .await
            .expect("Error creating temporary Postgres DB");

        let mysql_url = format!("{mysql_admin_url}/{db_name}");
        let pg_url = format!("{pg_admin_url}/{db_name}");

        Self {
            db_name,
            mysql_admin_url,
            pg_admin_url,
            mysql_url,
            pg_url,
        }
    }

    /// Drops both temporary databases. Call at the end of each test.
    pub async fn teardown(self) {
        if let Ok(mut conn) = MySqlConnection::connect(&self.mysql_admin_url).await {
            let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS {}", self.db_name))
                .execute(&mut conn)
                .await;
        }
        if let Ok(mut conn) = PgConnection::connect(&self.pg_admin_url).await {
            let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS {} (FORCE)", self.db_name))
                .execute(&mut conn)
                .await;
        }
    }
}

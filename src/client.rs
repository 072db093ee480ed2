//! Reading and writing tables through a [`Transport`].
//!
//! ```rust,ignore
//! use framehouse::prelude::*;
//!
//! let conn = Connection::connect(ConnectionConfig::load()?)?;
//! let table = conn.read_table("SELECT id, tags FROM events LIMIT 10").await?;
//! conn.write_table("events_copy", &table).await?;
//! ```

use crate::config::ConnectionConfig;
use crate::decoder::ArrayLiteralDecoder;
use crate::error::Result;
use crate::escape::quote_identifier;
use crate::table::Table;
use crate::transport::{HttpTransport, Transport};

pub const READ_FORMAT: &str = "TSVWithNamesAndTypes";
pub const WRITE_FORMAT: &str = "TSV";

/// A configured transport plus the decoder used for its responses.
#[derive(Debug, Clone)]
pub struct Connection<T = HttpTransport> {
    transport: T,
    config: ConnectionConfig,
    decoder: ArrayLiteralDecoder,
}

impl Connection<HttpTransport> {
    /// Connect over HTTP using `config`.
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> Connection<T> {
    pub fn with_transport(transport: T, config: ConnectionConfig) -> Self {
        let decoder = config.decoder();
        Self {
            transport,
            config,
            decoder,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn decoder(&self) -> &ArrayLiteralDecoder {
        &self.decoder
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run a query and return the raw response body.
    pub async fn execute(&self, query: &str) -> Result<Vec<u8>> {
        self.transport.execute(query, None).await
    }

    /// Run a SELECT and parse the result into a table.
    pub async fn read_table(&self, query: &str) -> Result<Table> {
        let query = select_query(query);
        let body = self.transport.execute(&query, None).await?;
        Table::from_tsv_with_names_and_types(&body, &self.decoder)
    }

    /// Insert every row of `table` into `table_name` in the configured database.
    pub async fn write_table(&self, table_name: &str, table: &Table) -> Result<()> {
        if table.is_empty() {
            tracing::debug!("Nothing to insert into {}", table_name);
            return Ok(());
        }
        let names: Vec<&str> = table.column_names().collect();
        let query = insert_query(&self.config.database, table_name, &names);
        let payload = table.to_tsv().into_bytes();
        tracing::debug!("Inserting {} rows into {}", table.num_rows(), table_name);
        self.transport.execute(&query, Some(payload)).await?;
        Ok(())
    }
}

/// Request the typed TSV format for a SELECT.
pub fn select_query(query: &str) -> String {
    let query = query.trim_end().trim_end_matches(';').trim_end();
    format!("{} FORMAT {}", query, READ_FORMAT)
}

/// Build `INSERT INTO `db`.`table` (`a`, `b`) FORMAT TSV`.
pub fn insert_query(database: &str, table_name: &str, columns: &[&str]) -> String {
    let columns: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
    format!(
        "INSERT INTO {}.{} ({}) FORMAT {}",
        quote_identifier(database),
        quote_identifier(table_name),
        columns.join(", "),
        WRITE_FORMAT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_query() {
        assert_eq!(
            select_query("SELECT 1;  \n"),
            "SELECT 1 FORMAT TSVWithNamesAndTypes"
        );
    }

    #[test]
    fn test_insert_query_quotes_identifiers() {
        assert_eq!(
            insert_query("db", "my`table", &["id", "it's"]),
            "INSERT INTO `db`.`my``table` (`id`, `it\\'s`) FORMAT TSV"
        );
    }
}

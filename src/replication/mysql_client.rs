//! Executor backed by the `mysql` command-line client
//!
//! Each statement runs as one `mysql --batch` invocation. The password is
//! handed over through `MYSQL_PWD` so it never appears in the process list.
//! Batch output is tab separated with a header line; values escape tab,
//! newline and backslash.

use std::process::Command;

use super::errors::{DatabaseError, DatabaseResult};
use super::executor::{Credentials, DatabaseExecutor, Row};
use super::statement::{split_host_port, Statement};

/// Client error codes meaning the server was never reached.
const CONNECTION_ERROR_CODES: &[&str] = &["ERROR 2002", "ERROR 2003", "ERROR 2005", "ERROR 2013"];

/// Runs statements through the `mysql` client binary.
#[derive(Debug, Clone)]
pub struct MysqlClientExecutor {
    mysql_bin: String,
}

impl MysqlClientExecutor {
    /// Use the client at `mysql_bin` (a path or a name looked up in `PATH`).
    pub fn new(mysql_bin: impl Into<String>) -> Self {
        Self {
            mysql_bin: mysql_bin.into(),
        }
    }

    fn command(&self, address: &str, credentials: &Credentials, sql: &str) -> Command {
        let (host, port) = split_host_port(address);
        let mut cmd = Command::new(&self.mysql_bin);
        cmd.arg("--batch")
            .arg("--host")
            .arg(host)
            .arg("--user")
            .arg(&credentials.user);
        if let Some(port) = port {
            cmd.arg("--port").arg(port.to_string());
        }
        cmd.arg("--execute").arg(sql);
        cmd.env("MYSQL_PWD", &credentials.password);
        cmd
    }
}

impl DatabaseExecutor for MysqlClientExecutor {
    fn execute(
        &self,
        address: &str,
        credentials: &Credentials,
        statement: &Statement,
    ) -> DatabaseResult<Vec<Row>> {
        let output = self
            .command(address, credentials, &statement.render())
            .output()
            .map_err(|e| {
                DatabaseError::connection(
                    address,
                    format!("failed to run {}: {}", self.mysql_bin, e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_failure(address, stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_batch_output(&stdout)
    }
}

fn classify_failure(address: &str, stderr: String) -> DatabaseError {
    if CONNECTION_ERROR_CODES
        .iter()
        .any(|code| stderr.starts_with(code))
    {
        DatabaseError::connection(address, stderr)
    } else {
        DatabaseError::Statement(stderr)
    }
}

/// Parse `mysql --batch` output into rows keyed by column name.
///
/// Empty output (statements without a result set) yields no rows.
pub fn parse_batch_output(output: &str) -> DatabaseResult<Vec<Row>> {
    let mut lines = output.lines().filter(|l| !l.is_empty());
    let header: Vec<&str> = match lines.next() {
        Some(line) => line.split('\t').collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for (index, line) in lines.enumerate() {
        let values: Vec<&str> = line.split('\t').collect();
        if values.len() != header.len() {
            return Err(DatabaseError::Parse(format!(
                "row {} has {} fields, header has {}",
                index + 1,
                values.len(),
                header.len()
            )));
        }
        rows.push(
            header
                .iter()
                .zip(values)
                .map(|(column, value)| (column.to_string(), unescape(value)))
                .collect(),
        );
    }
    Ok(rows)
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_batch_output("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_header_only() {
        assert!(parse_batch_output("Slave_IO_Running\tSlave_SQL_Running\n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_status_row() {
        let out = "Master_Host\tSlave_IO_Running\tSlave_SQL_Running\tLast_IO_Error\n\
                   10.0.0.1\tYes\tYes\t\n";
        let rows = parse_batch_output(out).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Master_Host"], "10.0.0.1");
        assert_eq!(rows[0]["Slave_SQL_Running"], "Yes");
        assert_eq!(rows[0]["Last_IO_Error"], "");
    }

    #[test]
    fn test_parse_escaped_values() {
        let out = "Last_IO_Error\nline one\\nline two\\ttab\n";
        let rows = parse_batch_output(out).unwrap();
        assert_eq!(rows[0]["Last_IO_Error"], "line one\nline two\ttab");
    }

    #[test]
    fn test_parse_rejects_ragged_rows() {
        let out = "a\tb\n1\n";
        assert!(matches!(
            parse_batch_output(out),
            Err(DatabaseError::Parse(_))
        ));
    }

    #[test]
    fn test_classify_connection_errors() {
        let err = classify_failure(
            "10.0.0.1",
            "ERROR 2003 (HY000): Can't connect to MySQL server on '10.0.0.1'".into(),
        );
        assert!(err.is_connection());

        let err = classify_failure("10.0.0.1", "ERROR 1045 (28000): Access denied".into());
        assert!(matches!(err, DatabaseError::Statement(_)));
    }

    #[test]
    fn test_command_passes_password_via_env() {
        let exec = MysqlClientExecutor::new("mysql");
        let cmd = exec.command(
            "10.0.0.1:3307",
            &Credentials::new("root", "pw"),
            "SHOW SLAVE STATUS",
        );
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.contains(&"--port".to_string()));
        assert!(args.contains(&"3307".to_string()));
        assert!(!args.iter().any(|a| a.contains("pw")));
        assert!(cmd
            .get_envs()
            .any(|(k, v)| k == "MYSQL_PWD" && v.map_or(false, |v| v == "pw")));
    }

    #[test]
    fn test_missing_binary_is_connection_error() {
        let exec = MysqlClientExecutor::new("/nonexistent/mysql-client");
        let err = exec
            .execute(
                "127.0.0.1",
                &Credentials::new("root", ""),
                &Statement::ShowReplicaStatus,
            )
            .unwrap_err();
        assert!(err.is_connection());
    }
}

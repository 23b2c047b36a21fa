use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use crate::server::config::{ConfigLoad, StorageEngine, DEFAULT_PROMPT};
use crate::rusty::CliHelper;
use crate::show::Show;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use log::info;
use rustyline::{CompletionType, Editor};
use rustyline::config::Builder;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use tokio::time::Instant;
use sqlkv::encoding::Value;
use sqlkv::engine::{CancellationToken, Connection, Database};
use sqlkv::error::Error;
use sqlkv::expr::Parameters;
use sqlkv::row::rows::ServerStats;
use sqlkv::storage::engine::Engine as StorageEngineTrait;
use sqlkv::storage::log_cask::LogCask;
use sqlkv::storage::memory::Memory;

/// Either backend a `Session` can run its `Connection` against, chosen by
/// `ConfigLoad::storage_engine` (§2's "memory vs logcask" switch).
enum Backend {
    Memory(Database<Memory>),
    LogCask(Database<LogCask>),
}

enum BackendConn<'a> {
    Memory(&'a mut Connection<Memory>),
    LogCask(&'a mut Connection<LogCask>),
}

/// One REPL/batch session: a SQL connection over a chosen storage backend,
/// plus the readline/history/multi-line-accumulation plumbing the teacher's
/// CLI already carried for its raw GET/SET dispatcher.
pub struct Session {
    is_repl: bool,

    running: Arc<AtomicBool>,

    memory_conn: Option<Connection<Memory>>,
    log_cask_conn: Option<Connection<LogCask>>,

    settings: ConfigLoad,
    query: String,
    in_comment_block: bool,

    keywords: Arc<Vec<String>>,
}

impl Session {
    pub async fn try_new(settings: ConfigLoad, is_repl: bool, running: Arc<AtomicBool>) -> Result<Self> {
        if is_repl {
            println!("Welcome to {}.", DEFAULT_PROMPT);
            println!("Connecting to Client.");
            println!();
        }

        let (memory_conn, log_cask_conn) = match settings.get_storage_engine() {
            StorageEngine::Memory => {
                let db = Database::new(Memory::new());
                (Some(db.connect()), None)
            }
            StorageEngine::LogCask => {
                let engine = LogCask::new_compact(settings.get_data_dir(), 0.2)?;
                let db = Database::new(engine);
                (None, Some(db.connect()))
            }
        };

        let keywords = SQL_KEYWORDS.iter().map(|k| k.to_string()).collect();

        Ok(Self {
            is_repl,
            running,
            memory_conn,
            log_cask_conn,
            settings,
            query: String::new(),
            in_comment_block: false,
            keywords: Arc::new(keywords),
        })
    }

    fn conn(&mut self) -> BackendConn<'_> {
        if let Some(conn) = self.memory_conn.as_mut() {
            BackendConn::Memory(conn)
        } else {
            BackendConn::LogCask(self.log_cask_conn.as_mut().expect("one backend is always open"))
        }
    }

    async fn prompt(&self) -> String {
        if !self.query.trim().is_empty() {
            format!("{} > ", DEFAULT_PROMPT).to_owned()
        } else {
            if self.settings.prompt.is_some() {
                let mut prompt = self.settings.prompt.as_ref().unwrap().clone();
                // prompt = prompt.replace("{user}", &user);
                format!("{} > ", prompt.trim_end())
            } else {
                format!("{} > ", DEFAULT_PROMPT)
            }
        }
    }

    pub async fn handle_repl(&mut self) {
        let config = Builder::new()
            .completion_prompt_limit(5)
            .completion_type(CompletionType::Circular)
            .build();
        let mut rl = Editor::<CliHelper, DefaultHistory>::with_config(config).unwrap();

        rl.set_helper(Some(CliHelper::with_keywords(self.keywords.clone())));
        rl.load_history(&get_history_path()).ok();

        'F: loop {
            if !self.running.load(Ordering::SeqCst) {
                break 'F;
            }

            match rl.readline(&self.prompt().await) {
                Ok(line) => {
                    let queries = self.append_query(&line);
                    for query in queries {
                        let _ = rl.add_history_entry(&query);
                        match self.handle_query(true, &query).await {
                            Ok(None) => {
                                break 'F;
                            }
                            Ok(Some(_)) => {}
                            Err(e) => {
                                eprintln!("error: {}", e);
                                self.query.clear();
                                break;
                            }
                        }
                    }
                },
                Err(e) => match e {
                    ReadlineError::Io(err) => {
                        eprintln!("io err: {err}");
                    }
                    ReadlineError::Interrupted => {
                        println!("^C");

                        self.query.clear();
                        self.running.store(false, Ordering::SeqCst);
                    }
                    ReadlineError::Eof => {
                        break;
                    }
                    _ => {}
                },
            }
        }

        println!("Bye~");
        let _ = rl.save_history(&get_history_path());
    }

    pub async fn handle_reader<R: BufRead>(&mut self, r: R) -> Result<()> {
        let start = Instant::now();
        let mut lines = r.lines();
        let mut stats: Option<ServerStats> = None;

        loop {
            match lines.next() {
                Some(Ok(line)) => {
                    let queries = self.append_query(&line);
                    for query in queries {
                        stats = self.handle_query(false, &query).await?;
                    }
                }
                Some(Err(e)) => {
                    return Err(anyhow!("read lines err: {}", e.to_string()));
                }
                None => break,
            }
        }

        // if the last query is not finished with `;`, we need to execute it.
        let query = self.query.trim().to_owned();
        if !query.is_empty() {
            self.query.clear();
            stats = self.handle_query(false, &query).await?;
        }

        // local time
        println!("{:.3}", start.elapsed().as_secs_f64());

        Ok(())
    }

    /// Accumulates partial statements across lines until a terminating `;`.
    fn append_query(&mut self, line: &str) -> Vec<String> {
        let line = line.trim();
        if line.is_empty() {
            return vec![];
        }

        if !self.settings.get_auto_append_part_cmd() {
            return vec![line.to_owned()];
        }

        if self.query.is_empty()
            &&
            (
                line.starts_with('.')
                || line == "exit"
                || line == "quit"
            )
        {
            return vec![line.to_owned()];
        }

        if self.settings.multi_line.is_some() && !self.settings.multi_line.as_ref().unwrap() {
            if line.starts_with("--") {
                return vec![];
            } else {
                return vec![line.to_owned()];
            }
        }

        self.query.push(' ');
        self.query.push_str(line);

        let mut queries = Vec::new();
        if self.query.trim_end().ends_with(';') {
            let sql = self.query.trim().to_owned();
            queries.push(sql);
            self.query.clear();
        }

        queries
    }

    /// executor cmd
    async fn handle_query(
        &mut self,
        is_repl: bool,
        query: &str,
    ) -> Result<Option<ServerStats>> {
        let query = query.trim_end_matches(';').trim();
        if is_repl && (query == "exit" || query == "quit") {
            return Ok(None); // exit
        }

        if query.is_empty() {
            return Ok(Some(ServerStats::default()));
        }

        if is_repl && query.starts_with('.') {
            let query = query
                .trim_start_matches('.')
                .split_whitespace()
                .collect::<Vec<_>>();
            if query.len() != 2 {
                return Err(anyhow!(
                    "Control command error, must be syntax of `.cmd_name cmd_value`."
                ));
            }

            self.settings.inject_cmd(query[0], query[1])?;
            info!("refresh config: {:?}", &self.settings);
            eprintln!("Refresh Config OK ~");

            return Ok(Some(ServerStats::default()));
        }

        self.run_sql(is_repl, query).await
    }

    async fn run_sql(&mut self, is_repl: bool, query: &str) -> Result<Option<ServerStats>> {
        let start = Instant::now();
        let show_affected = self.settings.is_show_affected();

        let result = match self.conn() {
            BackendConn::Memory(conn) => run_statement(conn, query),
            BackendConn::LogCask(conn) => run_statement(conn, query),
        };

        match result {
            Ok((columns, rows)) => {
                let count = rows.len();
                if is_repl {
                    if !columns.is_empty() {
                        eprintln!("{}", columns.join(" | "));
                    }
                    for row in &rows {
                        eprintln!("{}", format_row(row));
                    }
                }

                let show = Show::new_with_start(show_affected, is_repl, start);
                show.output(count as i64);

                let mut stats = ServerStats {
                    total_rows: count,
                    read_rows: count,
                    running_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                    ..Default::default()
                };
                stats.normalize();

                Ok(Some(stats))
            }
            Err(e) => {
                eprintln!("{}", e);
                Ok(Some(ServerStats::default()))
            }
        }
    }
}

fn run_statement<E: StorageEngineTrait>(conn: &mut Connection<E>, query: &str) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let cancellation = CancellationToken::new();
    let mut rows = conn.execute_with_cancellation(query, Parameters::None, &cancellation).map_err(to_anyhow)?;
    let columns = rows.columns().to_vec();
    let values: Vec<Vec<Value>> = rows.by_ref().map(|row| row.values).collect();
    Ok((columns, values))
}

fn to_anyhow(err: Error) -> anyhow::Error {
    anyhow!(err.to_string())
}

fn format_row(row: &[Value]) -> String {
    row.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" | ")
}

fn get_history_path() -> String {
    format!(
        "{}/.kvcli_history",
        std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
    )
}

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "HAVING", "ORDER", "ASC", "DESC",
    "LIMIT", "OFFSET", "UNION", "ALL", "DISTINCT", "AS", "AND", "OR", "NOT",
    "IN", "IS", "NULL", "LIKE", "TRUE", "FALSE", "CAST", "CREATE", "DROP",
    "TABLE", "INDEX", "SEQUENCE", "UNIQUE", "IF", "EXISTS", "PRIMARY", "KEY",
    "DEFAULT", "ON", "INCREMENT", "MINVALUE", "MAXVALUE", "START", "WITH",
    "CACHE", "CYCLE", "INSERT", "INTO", "VALUES", "UPDATE", "SET", "DELETE",
    "BEGIN", "COMMIT", "ROLLBACK", "READ", "ONLY",
];

#[cfg(test)]
mod test {
    use assert_cmd::prelude::*;
    use std::process::Command;

    #[test]
    fn unknown_flag_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let mut cmd = Command::cargo_bin("sqlkv-cli")?;

        cmd.arg("--not-a-real-flag");
        cmd.assert().failure();

        Ok(())
    }

    #[test]
    fn query_flag_runs_sql_non_interactively() -> Result<(), Box<dyn std::error::Error>> {
        let mut cmd = Command::cargo_bin("sqlkv-cli")?;

        cmd.arg("--non-interactive")
            .arg("--query=CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t (id) VALUES (1); SELECT id FROM t;");
        cmd.assert().success();

        Ok(())
    }

    #[test]
    fn bad_sql_on_stdin_does_not_crash() -> Result<(), Box<dyn std::error::Error>> {
        let mut cmd = Command::cargo_bin("sqlkv-cli")?;

        cmd.arg("--non-interactive").write_stdin("SELECT FROM;\n");
        cmd.assert().success();

        Ok(())
    }
}

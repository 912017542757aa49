// src/exec/loader.rs

//! Data loader handler.
//!
//! Loads CSV files (`source_csv`) or copies tables (`source_tables`) into
//! `dest_tables` of the datasource named by `dest_datasource`. Sources and
//! destinations are paired by position. The generated statements run
//! through `query_command` with the datasource's connection settings
//! exported as `TIERFLOW_DS_*` variables.

use anyhow::{anyhow, bail, ensure, Result};
use regex::Regex;

use crate::config::DataSourceConfig;
use crate::exec::query::run_statements;
use crate::exec::{HandlerContext, HandlerFuture, JobHandler};
use crate::tier::{JobData, JobUnit};

const TABLE_NAME: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$";

pub struct DataLoaderHandler;

impl JobHandler for DataLoaderHandler {
    fn run<'a>(&'a self, unit: &'a JobUnit, ctx: &'a HandlerContext) -> HandlerFuture<'a> {
        Box::pin(async move {
            let ds_name = unit.data.require_str("dest_datasource")?;
            let ds = ctx
                .datasource(ds_name)
                .ok_or_else(|| anyhow!("unknown datasource '{ds_name}'"))?;
            let statements = build_load_statements(&unit.data, ctx)?;
            run_statements(unit, ctx, &statements, &datasource_env(ds)).await
        })
    }
}

/// Statements for one data loader job, one per line.
pub fn build_load_statements(data: &JobData, ctx: &HandlerContext) -> Result<String> {
    let dest_tables = data
        .get_str_list("dest_tables")
        .ok_or_else(|| anyhow!("'dest_tables' must be a string or a list of strings"))?;
    let table_re = Regex::new(TABLE_NAME)?;
    check_tables(&table_re, &dest_tables)?;

    let statements: Vec<String> = if let Some(csvs) = data.get_str_list("source_csv") {
        ensure!(
            csvs.len() == dest_tables.len(),
            "{} source_csv entries for {} dest_tables",
            csvs.len(),
            dest_tables.len()
        );
        let base = data
            .get_str("source_path")
            .map(|p| ctx.resolve(p))
            .unwrap_or_else(|| ctx.base_dir.clone());
        csvs.iter()
            .zip(&dest_tables)
            .map(|(csv, table)| {
                let file = base.join(csv).to_string_lossy().replace('\'', "\\'");
                format!("LOAD DATA LOCAL INPATH '{file}' INTO TABLE {table};")
            })
            .collect()
    } else if let Some(sources) = data.get_str_list("source_tables") {
        ensure!(
            sources.len() == dest_tables.len(),
            "{} source_tables entries for {} dest_tables",
            sources.len(),
            dest_tables.len()
        );
        check_tables(&table_re, &sources)?;
        sources
            .iter()
            .zip(&dest_tables)
            .map(|(src, table)| format!("INSERT INTO TABLE {table} SELECT * FROM {src};"))
            .collect()
    } else {
        bail!("data loader needs 'source_csv' or 'source_tables'");
    };

    Ok(statements.join("\n"))
}

fn check_tables(re: &Regex, tables: &[String]) -> Result<()> {
    match tables.iter().find(|t| !re.is_match(t)) {
        Some(bad) => bail!("invalid table name '{bad}'"),
        None => Ok(()),
    }
}

/// Connection settings exported to the query command.
pub fn datasource_env(ds: &DataSourceConfig) -> Vec<(String, String)> {
    vec![
        ("TIERFLOW_DS_NAME".to_string(), ds.name.clone()),
        ("TIERFLOW_DS_URL".to_string(), ds.url.clone()),
        ("TIERFLOW_DS_USER".to_string(), ds.user_name.clone()),
        ("TIERFLOW_DS_PASSWORD".to_string(), ds.password.clone()),
        ("TIERFLOW_DS_DRIVER".to_string(), ds.driver.clone()),
    ]
}

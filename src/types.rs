use std::fmt;
use std::str::FromStr;

/// The closed set of job types a step can declare.
///
/// Configuration files may use either the descriptive names
/// (`warehouse_query`, `filesystem_transfer`, ...) or the short legacy
/// names (`hive`, `hdfs`, `spark`, ...). Matching is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepType {
    WarehouseQuery,
    FilesystemTransfer,
    DistributedComputeJob,
    Script,
    DataLoader,
    CustomFunction,
}

impl StepType {
    pub const ALL: [StepType; 6] = [
        StepType::WarehouseQuery,
        StepType::FilesystemTransfer,
        StepType::DistributedComputeJob,
        StepType::Script,
        StepType::DataLoader,
        StepType::CustomFunction,
    ];

    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::WarehouseQuery => "warehouse_query",
            StepType::FilesystemTransfer => "filesystem_transfer",
            StepType::DistributedComputeJob => "distributed_compute",
            StepType::Script => "script",
            StepType::DataLoader => "data_loader",
            StepType::CustomFunction => "custom_function",
        }
    }

    /// Parameters that must be present in a step of this type.
    ///
    /// `DataLoader` additionally needs one of `source_csv` / `source_tables`;
    /// that alternative is checked by the descriptor builder.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            StepType::WarehouseQuery => &["path"],
            StepType::FilesystemTransfer => &["mode", "source", "destination"],
            StepType::DistributedComputeJob => &["path", "class_name"],
            StepType::Script => &["path"],
            StepType::DataLoader => &["dest_datasource", "dest_tables"],
            StepType::CustomFunction => &["function"],
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "warehouse_query" | "hive" => Ok(StepType::WarehouseQuery),
            "filesystem_transfer" | "hdfs" => Ok(StepType::FilesystemTransfer),
            "distributed_compute" | "spark" => Ok(StepType::DistributedComputeJob),
            "script" => Ok(StepType::Script),
            "data_loader" | "dataloader" => Ok(StepType::DataLoader),
            "custom_function" | "custom" | "func" => Ok(StepType::CustomFunction),
            other => Err(format!("unknown step type \"{other}\"")),
        }
    }
}

/// Direction of a filesystem transfer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Local source into the managed filesystem.
    CopyIn,
    /// Managed filesystem out to a local destination.
    CopyOut,
}

impl TransferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::CopyIn => "copyIn",
            TransferMode::CopyOut => "copyOut",
        }
    }
}

impl FromStr for TransferMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "copyin" | "copy_in" | "copyfromlocal" => Ok(TransferMode::CopyIn),
            "copyout" | "copy_out" | "copytolocal" => Ok(TransferMode::CopyOut),
            other => Err(format!(
                "invalid transfer mode: {other} (expected \"copyIn\" or \"copyOut\")"
            )),
        }
    }
}

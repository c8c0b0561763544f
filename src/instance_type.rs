use std::{fmt, str::FromStr};

/// Instance types a user may pick for a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceType {
    C5Xlarge,
    P2Xlarge,
    P32xlarge,
}

impl InstanceType {
    pub const ALL: [InstanceType; 3] = [InstanceType::C5Xlarge, InstanceType::P2Xlarge, InstanceType::P32xlarge];

    /// Name as understood by EC2.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceType::C5Xlarge => "c5.xlarge",
            InstanceType::P2Xlarge => "p2.xlarge",
            InstanceType::P32xlarge => "p3.2xlarge",
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c5.xlarge" => Ok(Self::C5Xlarge),
            "p2.xlarge" => Ok(Self::P2Xlarge),
            "p3.2xlarge" => Ok(Self::P32xlarge),
            s => Err(anyhow::format_err!("Unknown instance type: {s}")),
        }
    }
}

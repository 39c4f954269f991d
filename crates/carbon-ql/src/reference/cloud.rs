use serde::Serialize;

/// Cloud providers with a published instance catalogue.
pub const CLOUD_PROVIDERS: &[&str] = &["aws"];

/// Virtual machine type and the share of a physical CPU it runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CloudInstance {
    pub provider: &'static str,
    pub instance_type: &'static str,
    /// Name resolved against the CPU reference profiles.
    pub cpu_name: &'static str,
    pub vcpus: u32,
    /// Physical cores backing the vCPUs.
    pub cores: u32,
}

const fn instance(
    provider: &'static str,
    instance_type: &'static str,
    cpu_name: &'static str,
    vcpus: u32,
    cores: u32,
) -> CloudInstance {
    CloudInstance {
        provider,
        instance_type,
        cpu_name,
        vcpus,
        cores,
    }
}

pub static CLOUD_INSTANCES: &[CloudInstance] = &[
    instance("aws", "t2.micro", "Intel Xeon E5-2676 v3", 1, 1),
    instance("aws", "t2.large", "Intel Xeon E5-2676 v3", 2, 1),
    instance("aws", "m4.large", "Intel Xeon E5-2686 v4", 2, 1),
    instance("aws", "m4.xlarge", "Intel Xeon E5-2686 v4", 4, 2),
    instance("aws", "m4.4xlarge", "Intel Xeon E5-2686 v4", 16, 8),
    instance("aws", "r4.large", "Intel Xeon E5-2686 v4", 2, 1),
    instance("aws", "m5a.large", "AMD EPYC 7571", 2, 1),
    instance("aws", "m5a.xlarge", "AMD EPYC 7571", 4, 2),
    instance("aws", "m6i.large", "Intel Xeon Platinum 8375C", 2, 1),
    instance("aws", "m6i.2xlarge", "Intel Xeon Platinum 8375C", 8, 4),
    instance("aws", "m6i.32xlarge", "Intel Xeon Platinum 8375C", 128, 64),
    // Graviton has no SMT: one vCPU per core.
    instance("aws", "m6g.large", "AWS Graviton2", 2, 2),
    instance("aws", "m6g.xlarge", "AWS Graviton2", 4, 4),
    instance("aws", "c6g.4xlarge", "AWS Graviton2", 16, 16),
];

/// Exact, case-sensitive lookup; instance type names are provider identifiers.
pub fn cloud_instance(provider: &str, instance_type: &str) -> Option<&'static CloudInstance> {
    CLOUD_INSTANCES
        .iter()
        .find(|instance| instance.provider == provider && instance.instance_type == instance_type)
}

/// Instance types offered by `provider`, in catalogue order.
pub fn instance_types(provider: &str) -> Vec<&'static str> {
    CLOUD_INSTANCES
        .iter()
        .filter(|instance| instance.provider == provider)
        .map(|instance| instance.instance_type)
        .collect()
}

//! Configuration for the provisioning units.
//!
//! Defaults reproduce the reference deployment: a `sonarqube` service on a
//! `sonarqube-fargate` cluster inside `10.100.0.0/16`.

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use strata_store::KeyScheme;

use crate::cidr::Ipv4Cidr;
use crate::error::{UnitError, UnitResult, ValidationError};

/// Default configuration file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "strata.toml";

/// Environment variable prefix; `__` separates nested keys.
pub const ENV_PREFIX: &str = "STRATA_";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Parameter namespace.
    pub parameters: ParameterConfig,
    /// Stage, naming and target environment.
    pub deployment: DeploymentConfig,
    /// Shared network layout.
    pub network: NetworkConfig,
    /// Image registry and source repository.
    pub artifacts: ArtifactConfig,
    /// Load-balanced service.
    pub service: ServiceConfig,
}

impl StrataConfig {
    /// Load configuration.
    ///
    /// Sources, later overriding earlier:
    /// 1. Default values
    /// 2. `path`, or `strata.toml` in the current directory if present
    /// 3. Environment variables with the `STRATA_` prefix
    ///
    /// # Errors
    /// Fails when an explicit `path` does not exist, a source cannot be
    /// parsed, or the result violates a static constraint.
    pub fn load(path: Option<&Path>) -> UnitResult<Self> {
        let file = match path {
            Some(path) if !path.exists() => {
                return Err(UnitError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            Some(path) => Toml::file(path),
            None => Toml::file(DEFAULT_CONFIG_FILE),
        };
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text layered over the defaults.
    ///
    /// # Errors
    /// Fails on malformed TOML or a violated constraint.
    pub fn from_toml(toml: &str) -> UnitResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every static constraint.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.deployment.validate()?;
        self.network.validate()?;
        self.service.validate()
    }
}

/// Parameter namespace configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterConfig {
    /// Root under which every key is published.
    pub prefix: String,
    /// Whether keys are partitioned by stage.
    pub scheme: KeyScheme,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            prefix: "/sonarqube-fargate-cdk".to_owned(),
            scheme: KeyScheme::StageScoped,
        }
    }
}

/// Naming and target environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Stage used when none is selected; other stages are protected.
    pub default_stage: String,
    /// Cluster base name; the stage is appended.
    pub cluster_name: String,
    /// Service name.
    pub service_name: String,
    /// Target account.
    pub account: String,
    /// Target region.
    pub region: String,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            default_stage: "dev".to_owned(),
            cluster_name: "sonarqube-fargate".to_owned(),
            service_name: "sonarqube".to_owned(),
            account: "000000000000".to_owned(),
            region: "us-east-1".to_owned(),
        }
    }
}

fn check_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::InvalidName {
            field,
            reason: "must not be empty",
        });
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ValidationError::InvalidName {
            field,
            reason: "only lowercase letters, digits and '-' are allowed",
        });
    }
    Ok(())
}

impl DeploymentConfig {
    /// Check names used in resource and stack names.
    ///
    /// # Errors
    /// Returns the first malformed name.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_name("deployment.default_stage", &self.default_stage)?;
        check_name("deployment.cluster_name", &self.cluster_name)?;
        check_name("deployment.service_name", &self.service_name)?;
        if self.account.is_empty() || self.region.is_empty() {
            return Err(ValidationError::InvalidName {
                field: "deployment.account/region",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

/// Shared network layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network address block.
    pub cidr: String,
    /// Availability zones to spread subnets across.
    pub max_azs: u8,
    /// NAT paths; private subnets share them round-robin.
    pub nat_gateways: u8,
    /// Public subnet prefix length.
    pub public_mask: u8,
    /// Private subnet prefix length.
    pub private_mask: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: "10.100.0.0/16".to_owned(),
            max_azs: 3,
            nat_gateways: 3,
            public_mask: 20,
            private_mask: 20,
        }
    }
}

impl NetworkConfig {
    /// Parsed address block.
    ///
    /// # Errors
    /// [`ValidationError::InvalidCidr`] for malformed text.
    pub fn block(&self) -> Result<Ipv4Cidr, ValidationError> {
        self.cidr.parse()
    }

    /// Public and private subnet blocks per availability zone.
    ///
    /// Public subnets come first, then private, each carved at its own mask
    /// without overlapping the other tier.
    ///
    /// # Errors
    /// [`ValidationError::SubnetLayout`] when a mask is out of range or the
    /// tiers do not fit.
    pub fn subnets(&self) -> Result<Vec<(Ipv4Cidr, Ipv4Cidr)>, ValidationError> {
        let block = self.block()?;
        for (field, mask) in [
            ("network.public_mask", self.public_mask),
            ("network.private_mask", self.private_mask),
        ] {
            if mask <= block.prefix() || mask > 28 {
                return Err(ValidationError::SubnetLayout(format!(
                    "{field} /{mask} must be longer than /{} and at most /28",
                    block.prefix()
                )));
            }
        }
        let azs = u32::from(self.max_azs);
        let misfit = |what: &str| {
            ValidationError::SubnetLayout(format!(
                "{azs} {what} subnets do not fit in {block}"
            ))
        };

        // Carve the larger subnets first so the smaller tier can start
        // right after them on an aligned boundary.
        let (first_mask, second_mask) = (
            self.public_mask.min(self.private_mask),
            self.public_mask.max(self.private_mask),
        );
        let first_span = u64::from(azs) * (1u64 << (32 - u32::from(first_mask)));
        let second_offset = u32::try_from(first_span >> (32 - u32::from(second_mask)))
            .map_err(|_| misfit("public"))?;

        let mut pairs = Vec::with_capacity(self.max_azs.into());
        for az in 0..azs {
            let first = block.subnet(first_mask, az).ok_or_else(|| misfit("first-tier"))?;
            let second = block
                .subnet(second_mask, second_offset + az)
                .ok_or_else(|| misfit("second-tier"))?;
            let (public, private) = if self.public_mask <= self.private_mask {
                (first, second)
            } else {
                (second, first)
            };
            pairs.push((public, private));
        }
        Ok(pairs)
    }

    /// Check zone, NAT and mask settings against the block.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_azs == 0 {
            return Err(ValidationError::NonPositive {
                field: "network.max_azs",
            });
        }
        if self.nat_gateways == 0 {
            return Err(ValidationError::NonPositive {
                field: "network.nat_gateways",
            });
        }
        if self.nat_gateways > self.max_azs {
            return Err(ValidationError::SubnetLayout(format!(
                "{} NAT gateways need as many public subnets, only {} AZs",
                self.nat_gateways, self.max_azs
            )));
        }
        self.subnets().map(|_| ())
    }
}

/// Image registry and source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Build context for the published image.
    pub build_directory: String,
    /// Tag the built image is copied to.
    pub image_tag: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            build_directory: "app".to_owned(),
            image_tag: "latest".to_owned(),
        }
    }
}

/// Where the service container image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum ImageSource {
    /// Built from a local directory during apply.
    Build {
        /// Build context.
        directory: String,
    },
    /// Pulled from a fixed registry URI.
    Registry {
        /// Image URI including tag.
        uri: String,
    },
}

impl Default for ImageSource {
    fn default() -> Self {
        Self::Build {
            directory: "app".to_owned(),
        }
    }
}

/// Load-balanced, autoscaled service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Port the container listens on.
    pub container_port: u16,
    /// Task cpu units.
    pub task_cpu: u32,
    /// Task memory in MiB.
    pub task_memory_mib: u32,
    /// Container cpu units.
    pub container_cpu: u32,
    /// Container soft memory limit in MiB.
    pub container_memory_reservation_mib: u32,
    /// Lower bound of running tasks during a rollout, percent of desired.
    pub min_healthy_percent: u32,
    /// Upper bound of running tasks during a rollout, percent of desired.
    pub max_healthy_percent: u32,
    /// Seconds before load balancer health checks count.
    pub health_check_grace_secs: u64,
    /// Allow interactive exec into running tasks.
    pub enable_execute_command: bool,
    /// Container image.
    pub image: ImageSource,
    /// Autoscaling policy.
    pub scaling: ScalingConfig,
    /// Load balancer and listener.
    pub load_balancer: LoadBalancerConfig,
    /// Target group health check.
    pub health_check: HealthCheckConfig,
    /// Container log destination.
    pub logs: LogConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            container_port: 9000,
            task_cpu: 1024,
            task_memory_mib: 2048,
            container_cpu: 1024,
            container_memory_reservation_mib: 1024,
            min_healthy_percent: 100,
            max_healthy_percent: 200,
            health_check_grace_secs: 0,
            enable_execute_command: true,
            image: ImageSource::default(),
            scaling: ScalingConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
            health_check: HealthCheckConfig::default(),
            logs: LogConfig::default(),
        }
    }
}

/// Supported task memory sizes for a cpu size.
fn supported_memory(cpu: u32) -> Option<(u32, u32, u32)> {
    // (min, max, step) in MiB
    match cpu {
        256 => Some((512, 2048, 512)),
        512 => Some((1024, 4096, 1024)),
        1024 => Some((2048, 8192, 1024)),
        2048 => Some((4096, 16384, 1024)),
        4096 => Some((8192, 30720, 1024)),
        _ => None,
    }
}

impl ServiceConfig {
    /// Check task shape, rollout, scaling, health check and ports.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.container_port == 0 {
            return Err(ValidationError::InvalidPort {
                field: "service.container_port",
            });
        }
        if self.load_balancer.listener_port == 0 {
            return Err(ValidationError::InvalidPort {
                field: "service.load_balancer.listener_port",
            });
        }

        let shape_ok = supported_memory(self.task_cpu).is_some_and(|(min, max, step)| {
            (min..=max).contains(&self.task_memory_mib) && (self.task_memory_mib - min) % step == 0
        });
        if !shape_ok {
            return Err(ValidationError::UnsupportedTaskShape {
                cpu: self.task_cpu,
                memory_mib: self.task_memory_mib,
            });
        }
        if self.container_cpu > self.task_cpu {
            return Err(ValidationError::ContainerExceedsTask {
                resource: "cpu",
                requested: self.container_cpu,
                available: self.task_cpu,
            });
        }
        if self.container_memory_reservation_mib > self.task_memory_mib {
            return Err(ValidationError::ContainerExceedsTask {
                resource: "memory",
                requested: self.container_memory_reservation_mib,
                available: self.task_memory_mib,
            });
        }
        if self.container_memory_reservation_mib == 0 {
            return Err(ValidationError::NonPositive {
                field: "service.container_memory_reservation_mib",
            });
        }

        if self.min_healthy_percent < 100 || self.max_healthy_percent <= self.min_healthy_percent {
            return Err(ValidationError::DeploymentBounds {
                min_healthy: self.min_healthy_percent,
                max_healthy: self.max_healthy_percent,
            });
        }

        self.scaling.validate()?;
        self.health_check.validate()?;

        if let ImageSource::Registry { uri } = &self.image {
            if uri.is_empty() {
                return Err(ValidationError::InvalidName {
                    field: "service.image.uri",
                    reason: "must not be empty",
                });
            }
        }
        Ok(())
    }
}

/// CPU-target autoscaling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Fewest running tasks.
    pub min_capacity: u32,
    /// Most running tasks.
    pub max_capacity: u32,
    /// Average cpu utilization to hold.
    pub target_cpu_percent: u32,
    /// Wait after adding capacity.
    pub scale_out_cooldown_secs: u64,
    /// Wait after removing capacity.
    pub scale_in_cooldown_secs: u64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_capacity: 1,
            max_capacity: 100,
            target_cpu_percent: 50,
            scale_out_cooldown_secs: 60,
            scale_in_cooldown_secs: 120,
        }
    }
}

impl ScalingConfig {
    /// Check capacity bounds, target and cooldown asymmetry.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.min_capacity == 0 {
            return Err(ValidationError::NonPositive {
                field: "service.scaling.min_capacity",
            });
        }
        if self.min_capacity > self.max_capacity {
            return Err(ValidationError::CapacityBounds {
                min: self.min_capacity,
                max: self.max_capacity,
            });
        }
        if !(1..=100).contains(&self.target_cpu_percent) {
            return Err(ValidationError::TargetUtilization(self.target_cpu_percent));
        }
        if self.scale_out_cooldown_secs >= self.scale_in_cooldown_secs {
            return Err(ValidationError::CooldownOrder {
                scale_out_secs: self.scale_out_cooldown_secs,
                scale_in_secs: self.scale_in_cooldown_secs,
            });
        }
        Ok(())
    }
}

/// Public load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Public listener port.
    pub listener_port: u16,
    /// Expose on public subnets.
    pub internet_facing: bool,
    /// Connection idle timeout.
    pub idle_timeout_secs: u64,
    /// Drain time for deregistered targets.
    pub deregistration_delay_secs: u64,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            listener_port: 80,
            internet_facing: true,
            idle_timeout_secs: 30,
            deregistration_delay_secs: 15,
        }
    }
}

/// Target group health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// HTTP path probed.
    pub path: String,
    /// Consecutive successes to mark healthy.
    pub healthy_threshold: u32,
    /// Consecutive failures to mark unhealthy.
    pub unhealthy_threshold: u32,
    /// Seconds between checks.
    pub interval_secs: u64,
    /// Seconds before a check fails.
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: "/maintenance".to_owned(),
            healthy_threshold: 2,
            unhealthy_threshold: 5,
            interval_secs: 31,
            timeout_secs: 30,
        }
    }
}

impl HealthCheckConfig {
    /// Check thresholds and timing.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.healthy_threshold == 0 {
            return Err(ValidationError::NonPositive {
                field: "service.health_check.healthy_threshold",
            });
        }
        if self.unhealthy_threshold == 0 {
            return Err(ValidationError::NonPositive {
                field: "service.health_check.unhealthy_threshold",
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::NonPositive {
                field: "service.health_check.timeout_secs",
            });
        }
        if self.interval_secs <= self.timeout_secs {
            return Err(ValidationError::HealthCheckTiming {
                interval_secs: self.interval_secs,
                timeout_secs: self.timeout_secs,
            });
        }
        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidName {
                field: "service.health_check.path",
                reason: "must start with '/'",
            });
        }
        Ok(())
    }
}

/// Container log destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Days to keep log events.
    pub retention_days: u32,
    /// Remove the log group when the service unit is torn down.
    pub destroy_with_unit: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            retention_days: 14,
            destroy_with_unit: true,
        }
    }
}

pub mod archive;
pub mod exec;
pub mod image;
pub mod isolation;
pub mod manager;
pub mod memory;
pub mod runtime;

pub use isolation::{
    CreateOptions, IsolationEnvironment, IsolationHandle, IsolationSettings, LifecycleStatus, RuntimeMode,
};
pub use manager::DockerRuntime;
pub use memory::MemoryRuntime;
pub use runtime::{ContainerRuntime, ContainerSpec, ExecOutput, VolumeMount};

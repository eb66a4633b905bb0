//! Fixed constants referenced by the directive algebra: the global
//! mount-point list the header `mkdir -p`s over (§6) and the
//! heredoc-writer contents for `/usr/bin/ll` (§4.3 step 7).

/// The fixed global mount-points list (§6 External Interfaces),
/// `mkdir -p`'d as a single RUN by the default header.
pub const GLOBAL_MOUNT_POINTS: &[&str] = &[
    "/afm01",
    "/afm02",
    "/cvmfs",
    "/90days",
    "/30days",
    "/QRISdata",
    "/RDS",
    "/data",
    "/short",
    "/proc_temp",
    "/TMPDIR",
    "/nvme",
    "/neurodesktop-storage",
    "/local",
    "/gpfs1",
    "/working",
    "/winmounts",
    "/state",
    "/tmp",
    "/autofs",
    "/cluster",
    "/local_mount",
    "/scratch",
    "/clusterdata",
    "/nvmescratch",
];

/// The `/usr/bin/ll` writer emitted unconditionally by the header
/// (§4.3 step 7): a thin `ls -la` wrapper neurocontainer images carry
/// for interactive use.
pub const LL_SCRIPT: &str = "#!/bin/bash\nls -la \"$@\"\n";

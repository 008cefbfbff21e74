//! Starter configurations written by `kiln init`

use crate::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Built-in starter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// XFOIL 6.99: plotlib, orrs generator and the xfoil binary built with gfortran
    Xfoil,
    /// Single required component with one compiler rule
    Minimal,
}

impl Preset {
    pub fn all() -> [Preset; 2] {
        [Self::Xfoil, Self::Minimal]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Xfoil => "xfoil",
            Self::Minimal => "minimal",
        }
    }

    /// TOML text of the preset
    pub fn render(&self) -> &'static str {
        match self {
            Self::Xfoil => XFOIL,
            Self::Minimal => MINIMAL,
        }
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "preset".to_string(),
                reason: format!("unknown preset '{}' (expected xfoil or minimal)", s),
            })
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const MINIMAL: &str = r#"# kiln.toml
[source]
url = "https://example.org/downloads/tool-1.0.tar.gz"

[paths]
work_dir = "build"
install_dir = "/usr/local/bin"

[[component]]
name = "main"
pattern = "bin"
artifact = "tool"
verify_args = ["--version"]

[[patch.rule]]
name = "fortran-compiler"
pattern = '(?m)^(\s*FC\s*=\s*)f77[ \t]*$'
replacement = "${1}gfortran"
example = "FC = f77"
"#;

const XFOIL: &str = r#"# kiln.toml - XFOIL 6.99 built with gfortran
[source]
url = "https://web.mit.edu/drela/Public/web/xfoil/xfoil6.99.tgz"

[paths]
work_dir = "build"
install_dir = "/usr/local/bin"

[toolchain]
build_tool = "make"
timeout_secs = 1800
search_depth = 4

[[component]]
name = "plotlib"
pattern = "plotlib"
target = "libPlt_gDP.a"
artifact = "libPlt_gDP.a"
required = false

[[component]]
name = "generator"
pattern = "orrs/bin"
target = "osgen"
artifact = "osgen"
required = false

[[component]]
name = "main"
pattern = "bin"
target = "xfoil"
artifact = "xfoil"
depends_on = ["plotlib"]
install_name = "xfoil"
verify_stdin = "QUIT\n"

[patch]
files = ["makefile*", "config.make*"]

[[patch.rule]]
name = "fortran-compiler"
pattern = '(?m)^(\s*FC\s*=\s*)(?:f77|g77|ifort|ifc)[ \t]*$'
replacement = "${1}gfortran"
example = "FC = f77"

[[patch.rule]]
name = "c-compiler"
pattern = '(?m)^(\s*CC\s*=\s*)(?:cc|icc)[ \t]*$'
replacement = "${1}gcc"
example = "CC = cc"

[[patch.rule]]
name = "intel-fp-trap"
pattern = " -fpe0"
replacement = ""
literal = true

[[patch.rule]]
name = "intel-bounds-check"
pattern = " -CB"
replacement = ""
literal = true

[[patch.rule]]
name = "intel-double"
pattern = '-r8\b'
replacement = "-fdefault-real-8"

[[patch.rule]]
name = "argument-mismatch"
pattern = '(?m)^(\s*FFLAGS\s*=\s*)-O[ \t]*$'
replacement = "${1}-O -fallow-argument-mismatch"
example = "FFLAGS = -O"

[[patch.rule]]
name = "x11-lib-path"
pattern = "/usr/X11R6/lib"
replacement = "/usr/lib"
literal = true

[[patch.rule]]
name = "x11-include-path"
pattern = "/usr/X11R6/include"
replacement = "/usr/include"
literal = true

[headless]
mode = "auto"
component = "plotlib"
probe = ["/usr/include/X11/Xlib.h"]
language = "fortran"
compiler = "gfortran"
archive = "libPlt_gDP.a"
aliases = ["libPlt.a", "libPlt_gSP.a"]

[[headless.symbol]]
name = "plinitialize"

[[headless.symbol]]
name = "plopen"
args = ["relsize", "ipslu", "idev"]

[[headless.symbol]]
name = "plclose"

[[headless.symbol]]
name = "plflush"

[[headless.symbol]]
name = "plend"

[[headless.symbol]]
name = "plot"
args = ["x", "y", "ipen"]

[[headless.symbol]]
name = "plotabs"
args = ["x", "y", "ipen"]

[[headless.symbol]]
name = "newpen"
args = ["ipen"]

[[headless.symbol]]
name = "newcolor"
args = ["icol"]

[[headless.symbol]]
name = "newcolorname"
args = ["colname"]

[[headless.symbol]]
name = "newfactor"
args = ["fac"]

[[headless.symbol]]
name = "newpat"
args = ["ipat"]

[[headless.symbol]]
name = "plchar"
args = ["x", "y", "size", "string", "angle", "nchar"]

[[headless.symbol]]
name = "plmath"
args = ["x", "y", "size", "string", "angle", "nchar"]

[[headless.symbol]]
name = "plnumb"
args = ["x", "y", "size", "value", "angle", "ndigit"]

[[headless.symbol]]
name = "plsymb"
args = ["x", "y", "size", "isym", "angle", "ninc"]

[[headless.symbol]]
name = "plgrid"
args = ["x", "y", "nx", "xd", "ny", "yd", "lmask"]

[[headless.symbol]]
name = "xaxis"
args = ["x1", "y1", "xaxt", "dxann", "fann", "dann", "chsz", "ndig"]

[[headless.symbol]]
name = "yaxis"
args = ["x1", "y1", "yaxt", "dyann", "fann", "dann", "chsz", "ndig"]

[[headless.symbol]]
name = "getcolor"
args = ["icol"]

[[headless.symbol]]
name = "getpen"
args = ["ipen"]

[[headless.symbol]]
name = "getfactors"
args = ["xfac", "yfac"]

[[headless.symbol]]
name = "getzoomabs"
args = ["xoff", "yoff", "xfac", "yfac"]

[[headless.symbol]]
name = "getwinsize"
args = ["xwind", "ywind"]

[[headless.symbol]]
name = "getcursorxy"
args = ["x", "y", "chkey"]

[[headless.symbol]]
name = "replot"
args = ["idev"]

[[headless.symbol]]
name = "drawtoscreen"

[[headless.symbol]]
name = "drawtobuffer"

[[headless.symbol]]
name = "showbuffer"

[[headless.symbol]]
name = "colorspectrumhues"
args = ["ncols", "hues"]

[[headless.symbol]]
name = "gethues"
args = ["ncols", "hues"]

[[headless.symbol]]
name = "plsubs"
args = ["x", "y", "size", "string", "angle", "nchar", "pltype"]

[[headless.symbol]]
name = "usrusr"
args = ["xusr", "yusr"]

[[headless.symbol]]
name = "plzero"
args = ["x", "y"]
"#;

pub use crate::GroundTruth;
pub use anyhow::{bail, ensure, format_err, Context as _, Result};
pub use bbox::{prelude::*, BoxCodec, Delta, HW, TLBR};
pub use itertools::{iproduct, Itertools as _};
pub use log::{debug, info, warn};
pub use noisy_float::prelude::*;
pub use rand::prelude::*;
pub use rayon::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    cmp::Ordering,
    collections::HashSet,
    path::Path,
    str::FromStr,
};

unzip_n::unzip_n!(pub 3);

//! Static codebook tables
//!
//! All vector codebooks are stored as `i8` entries with a per-table scale.
//! The stochastic tables are generated at compile time by a deterministic
//! generator (xorshift32 shaped by an Irwin–Hall sum of four bytes, which
//! gives an approximately Gaussian distribution), so encoder and decoder
//! built from the same sources always agree on every entry.
//!
//! The generated tables are not trained on speech. Their statistics match
//! what the searches expect, but they give up quality against trained
//! codebooks, most visibly at the lowest rates: the 2.15 kbps vocoder
//! submode does not track the waveform (its SNR against the input is
//! around 0 dB) and the low-rate LSP quantizer leaves audible spectral
//! error.
//!
//! Scalar gain tables and the layer size tables are written out directly.

/// Row-major `i8` codebook with bounds-checked (entry, dimension) access
#[derive(Debug, Clone, Copy)]
pub struct Codebook {
    data: &'static [i8],
    dim: usize,
    scale: f32,
}

impl Codebook {
    /// Wrap `data` as entries of `dim` values, each worth `scale`
    pub const fn new(data: &'static [i8], dim: usize, scale: f32) -> Self {
        Self { data, dim, scale }
    }

    /// Number of entries
    pub const fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    /// Entry dimension
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Value of one step of the stored integers
    pub const fn scale(&self) -> f32 {
        self.scale
    }

    /// Raw integer entry
    pub fn entry(&self, index: usize) -> &'static [i8] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    /// Raw integer value at (entry, dimension)
    pub fn raw(&self, index: usize, d: usize) -> f32 {
        assert!(d < self.dim, "dimension {} out of range {}", d, self.dim);
        f32::from(self.data[index * self.dim + d])
    }

    /// Scaled value at (entry, dimension)
    pub fn value(&self, index: usize, d: usize) -> f32 {
        self.raw(index, d) * self.scale
    }

    /// Iterate over raw entries
    pub fn entries(&self) -> impl Iterator<Item = &'static [i8]> {
        self.data.chunks_exact(self.dim)
    }
}

const fn xorshift32(mut x: u32) -> u32 {
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    x
}

/// Approximately Gaussian `i8` values with standard deviation `spread`
const fn gaussian_table<const N: usize>(seed: u32, spread: i32) -> [i8; N] {
    let mut out = [0i8; N];
    let mut state = seed;
    let mut i = 0;
    while i < N {
        state = xorshift32(state);
        let sum = (state & 0xff) + ((state >> 8) & 0xff) + ((state >> 16) & 0xff) + (state >> 24);
        // Sum of four uniform bytes: mean 510, standard deviation ~147.8
        let mut v = (sum as i32 - 510) * spread / 148;
        if v > 127 {
            v = 127;
        } else if v < -127 {
            v = -127;
        }
        out[i] = v as i8;
        i += 1;
    }
    out
}

/// Replace the first entry of a `dim`-wide table with zeros
const fn zero_first<const N: usize>(mut table: [i8; N], dim: usize) -> [i8; N] {
    let mut d = 0;
    while d < dim {
        table[d] = 0;
        d += 1;
    }
    table
}

/// 3-tap pitch gains: `levels` centre-tap values crossed with side-tap patterns
const fn pitch_gain_table<const N: usize>(levels: usize, max_center: i32) -> [i8; N] {
    const SIDES: [[i32; 2]; 8] = [
        [0, 0],
        [6, 6],
        [10, -4],
        [-4, 10],
        [-6, -6],
        [14, 4],
        [4, 14],
        [16, 16],
    ];
    let patterns = N / 3 / levels;
    let mut out = [0i8; N];
    let mut k = 0;
    while k < levels {
        let center = max_center * k as i32 / (levels as i32 - 1);
        let mut p = 0;
        while p < patterns {
            let base = (k * patterns + p) * 3;
            out[base] = SIDES[p][0] as i8;
            out[base + 1] = center as i8;
            out[base + 2] = SIDES[p][1] as i8;
            p += 1;
        }
        k += 1;
    }
    out
}

/// Coarse log2 gain contours: 8 levels crossed with 8 shapes of 4 points
const fn gain_contour_table() -> [i8; 256] {
    const SHAPES: [[i32; 4]; 8] = [
        [0, 0, 0, 0],
        [8, 4, -4, -8],
        [-8, -4, 4, 8],
        [6, -6, -6, 6],
        [-6, 6, 6, -6],
        [10, 0, 0, -10],
        [-10, 0, 0, 10],
        [6, -6, 6, -6],
    ];
    let mut out = [0i8; 256];
    let mut k = 0;
    while k < 64 {
        let level = -40 + (k / 8) as i32 * 8;
        let mut d = 0;
        while d < 4 {
            out[k * 4 + d] = (level + SHAPES[k % 8][d]) as i8;
            d += 1;
        }
        k += 1;
    }
    out
}

static LSP_STAGE1_DATA: [i8; 640] = zero_first(gaussian_table::<640>(0x5eed_0001, 40), 10);
static LSP_LOW1_DATA: [i8; 320] = zero_first(gaussian_table::<320>(0x5eed_0002, 24), 5);
static LSP_LOW2_DATA: [i8; 320] = zero_first(gaussian_table::<320>(0x5eed_0003, 12), 5);
static LSP_HIGH1_DATA: [i8; 320] = zero_first(gaussian_table::<320>(0x5eed_0004, 24), 5);
static LSP_HIGH2_DATA: [i8; 320] = zero_first(gaussian_table::<320>(0x5eed_0005, 12), 5);

/// First LSP stage: 64 entries of 10 coefficients, units of 1/256 rad
pub static LSP_STAGE1: Codebook = Codebook::new(&LSP_STAGE1_DATA, 10, 1.0 / 256.0);
/// Low-half refinement: 64 entries of 5, units of 1/512 rad
pub static LSP_LOW1: Codebook = Codebook::new(&LSP_LOW1_DATA, 5, 1.0 / 512.0);
/// Low-half second refinement: units of 1/1024 rad
pub static LSP_LOW2: Codebook = Codebook::new(&LSP_LOW2_DATA, 5, 1.0 / 1024.0);
/// High-half refinement: units of 1/512 rad
pub static LSP_HIGH1: Codebook = Codebook::new(&LSP_HIGH1_DATA, 5, 1.0 / 512.0);
/// High-half second refinement: units of 1/1024 rad
pub static LSP_HIGH2: Codebook = Codebook::new(&LSP_HIGH2_DATA, 5, 1.0 / 1024.0);

static EXC_10_16_DATA: [i8; 160] = gaussian_table::<160>(0xc0de_0010, 32);
static EXC_10_32_DATA: [i8; 320] = gaussian_table::<320>(0xc0de_0020, 32);
static EXC_5_32_DATA: [i8; 160] = gaussian_table::<160>(0xc0de_0030, 32);
static EXC_5_256_DATA: [i8; 1280] = gaussian_table::<1280>(0xc0de_0040, 32);
static EXC_5_128_DATA: [i8; 640] = gaussian_table::<640>(0xc0de_0050, 32);

/// Innovation shapes, 16 × 10
pub static EXC_10_16: Codebook = Codebook::new(&EXC_10_16_DATA, 10, 1.0 / 32.0);
/// Innovation shapes, 32 × 10
pub static EXC_10_32: Codebook = Codebook::new(&EXC_10_32_DATA, 10, 1.0 / 32.0);
/// Innovation shapes, 32 × 5
pub static EXC_5_32: Codebook = Codebook::new(&EXC_5_32_DATA, 5, 1.0 / 32.0);
/// Innovation shapes, 256 × 5
pub static EXC_5_256: Codebook = Codebook::new(&EXC_5_256_DATA, 5, 1.0 / 32.0);
/// Innovation shapes, 128 × 5, used with a sign bit
pub static EXC_5_128: Codebook = Codebook::new(&EXC_5_128_DATA, 5, 1.0 / 32.0);

static PITCH_GAIN_LBR_DATA: [i8; 96] = pitch_gain_table::<96>(8, 80);
static PITCH_GAIN_NB_DATA: [i8; 384] = pitch_gain_table::<384>(16, 80);

/// 3-tap pitch gains, 32 entries, units of 1/64
pub static PITCH_GAIN_LBR: Codebook = Codebook::new(&PITCH_GAIN_LBR_DATA, 3, 1.0 / 64.0);
/// 3-tap pitch gains, 128 entries, units of 1/64
pub static PITCH_GAIN_NB: Codebook = Codebook::new(&PITCH_GAIN_NB_DATA, 3, 1.0 / 64.0);

static GAIN_CONTOUR_DATA: [i8; 256] = gain_contour_table();
static GAIN_RESIDUAL_DATA: [i8; 512] = zero_first(gaussian_table::<512>(0x9a1e_0001, 5), 8);

/// Split-codebook gain contour (log2 domain), 64 × 4, units of 1/16
pub static GAIN_CONTOUR: Codebook = Codebook::new(&GAIN_CONTOUR_DATA, 4, 1.0 / 16.0);
/// Split-codebook gain residual (log2 domain), 64 × 8, units of 1/16
pub static GAIN_RESIDUAL: Codebook = Codebook::new(&GAIN_RESIDUAL_DATA, 8, 1.0 / 16.0);

/// 1-bit subframe gain correction
pub const SCAL_GAIN_1: [f32; 2] = [0.70469, 1.05127];
/// Decision boundaries for [`SCAL_GAIN_1`]
pub const SCAL_GAIN_1_BOUND: [f32; 1] = [0.860_707];

/// 3-bit subframe gain correction (also the multi-pulse gain table)
pub const SCAL_GAIN_3: [f32; 8] = [
    0.061130, 0.163546, 0.320798, 0.559907, 0.938454, 1.523890, 2.417010, 3.820520,
];
/// Decision boundaries for [`SCAL_GAIN_3`] (geometric means of neighbours)
pub const SCAL_GAIN_3_BOUND: [f32; 7] = [
    0.099_988, 0.229_052, 0.423_813, 0.724_877, 1.195_868, 1.919_181, 3.038_789,
];

/// Bits occupied by a wideband layer, including its flag and 3-bit id;
/// zero marks an id that cannot be skipped
pub const WIDEBAND_LAYER_BITS: [usize; 8] = [0, 36, 112, 192, 352, 0, 0, 0];

/// Index of the first boundary that `value` does not exceed
pub fn scalar_quant(value: f32, bounds: &[f32]) -> usize {
    bounds.iter().take_while(|&&b| value > b).count()
}

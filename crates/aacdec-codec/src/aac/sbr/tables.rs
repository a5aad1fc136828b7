//! SBR 与 PS 的 Huffman 码本 (ISO/IEC 14496-3 附录 4.A.6.1, 8.B).
//!
//! 每项为 (码字, 码长), 下标即符号值; 解码值为符号减去码本偏移.

use std::sync::LazyLock;

use aacdec_core::AacResult;
use aacdec_core::bitreader::BitReader;

use crate::aac::huffman::{ROOT_BITS, Vlc};

// ============================================================
// SBR 包络与噪声 (Table 4.A.78 - 4.A.87)
// ============================================================

// 包络时间差分 1.5dB
#[rustfmt::skip]
pub(super) const T_ENV_1_5: [(u32, u8); 121] = [
    (0x3FFD6, 18), (0x3FFD7, 18), (0x3FFD8, 18), (0x3FFD9, 18), (0x3FFDA, 18), (0x3FFDB, 18),
    (0x7FFB8, 19), (0x7FFB9, 19), (0x7FFBA, 19), (0x7FFBB, 19), (0x7FFBC, 19), (0x7FFBD, 19),
    (0x7FFBE, 19), (0x7FFBF, 19), (0x7FFC0, 19), (0x7FFC1, 19), (0x7FFC2, 19), (0x7FFC3, 19),
    (0x7FFC4, 19), (0x7FFC5, 19), (0x7FFC6, 19), (0x7FFC7, 19), (0x7FFC8, 19), (0x7FFC9, 19),
    (0x7FFCA, 19), (0x7FFCB, 19), (0x7FFCC, 19), (0x7FFCD, 19), (0x7FFCE, 19), (0x7FFCF, 19),
    (0x7FFD0, 19), (0x7FFD1, 19), (0x7FFD2, 19), (0x7FFD3, 19), (0x1FFE6, 17), (0x3FFD4, 18),
    (0xFFF0, 16), (0x1FFE9, 17), (0x3FFD5, 18), (0x1FFE7, 17), (0xFFF1, 16), (0xFFEC, 16),
    (0xFFED, 16), (0xFFEE, 16), (0x7FF4, 15), (0x3FF9, 14), (0x3FF7, 14), (0x1FFA, 13),
    (0x1FF9, 13), (0xFFB, 12), (0x7FC, 11), (0x3FC, 10), (0x1FD, 9), (0xFD, 8),
    (0x7D, 7), (0x3D, 6), (0x1D, 5), (0xD, 4), (0x5, 3), (0x1, 2),
    (0x0, 2), (0x4, 3), (0xC, 4), (0x1C, 5), (0x3C, 6), (0x7C, 7),
    (0xFC, 8), (0x1FC, 9), (0x3FD, 10), (0xFFA, 12), (0x1FF8, 13), (0x3FF6, 14),
    (0x3FF8, 14), (0x7FF5, 15), (0xFFEF, 16), (0x1FFE8, 17), (0xFFF2, 16), (0x7FFD4, 19),
    (0x7FFD5, 19), (0x7FFD6, 19), (0x7FFD7, 19), (0x7FFD8, 19), (0x7FFD9, 19), (0x7FFDA, 19),
    (0x7FFDB, 19), (0x7FFDC, 19), (0x7FFDD, 19), (0x7FFDE, 19), (0x7FFDF, 19), (0x7FFE0, 19),
    (0x7FFE1, 19), (0x7FFE2, 19), (0x7FFE3, 19), (0x7FFE4, 19), (0x7FFE5, 19), (0x7FFE6, 19),
    (0x7FFE7, 19), (0x7FFE8, 19), (0x7FFE9, 19), (0x7FFEA, 19), (0x7FFEB, 19), (0x7FFEC, 19),
    (0x7FFED, 19), (0x7FFEE, 19), (0x7FFEF, 19), (0x7FFF0, 19), (0x7FFF1, 19), (0x7FFF2, 19),
    (0x7FFF3, 19), (0x7FFF4, 19), (0x7FFF5, 19), (0x7FFF6, 19), (0x7FFF7, 19), (0x7FFF8, 19),
    (0x7FFF9, 19), (0x7FFFA, 19), (0x7FFFB, 19), (0x7FFFC, 19), (0x7FFFD, 19), (0x7FFFE, 19),
    (0x7FFFF, 19),
];

// 包络频率差分 1.5dB
#[rustfmt::skip]
pub(super) const F_ENV_1_5: [(u32, u8); 121] = [
    (0x7FFE7, 19), (0x7FFE8, 19), (0xFFFD2, 20), (0xFFFD3, 20), (0xFFFD4, 20), (0xFFFD5, 20),
    (0xFFFD6, 20), (0xFFFD7, 20), (0xFFFD8, 20), (0x7FFDA, 19), (0xFFFD9, 20), (0xFFFDA, 20),
    (0xFFFDB, 20), (0xFFFDC, 20), (0x7FFDB, 19), (0xFFFDD, 20), (0x7FFDC, 19), (0x7FFDD, 19),
    (0xFFFDE, 20), (0x3FFE4, 18), (0xFFFDF, 20), (0xFFFE0, 20), (0xFFFE1, 20), (0x7FFDE, 19),
    (0xFFFE2, 20), (0xFFFE3, 20), (0xFFFE4, 20), (0x7FFDF, 19), (0xFFFE5, 20), (0x7FFE0, 19),
    (0x3FFE8, 18), (0x7FFE1, 19), (0x3FFE0, 18), (0x3FFE9, 18), (0x1FFEF, 17), (0x3FFE5, 18),
    (0x1FFEC, 17), (0x1FFED, 17), (0x1FFEE, 17), (0xFFF4, 16), (0xFFF3, 16), (0xFFF0, 16),
    (0x7FF7, 15), (0x7FF6, 15), (0x3FFA, 14), (0x1FFA, 13), (0x1FF9, 13), (0xFFA, 12),
    (0xFF8, 12), (0x7F9, 11), (0x3FB, 10), (0x1FC, 9), (0x1FA, 9), (0xFB, 8),
    (0x7C, 7), (0x3C, 6), (0x1C, 5), (0xC, 4), (0x5, 3), (0x1, 2),
    (0x0, 2), (0x4, 3), (0xD, 4), (0x1D, 5), (0x3D, 6), (0xFA, 8),
    (0xFC, 8), (0x1FB, 9), (0x3FA, 10), (0x7F8, 11), (0x7FA, 11), (0x7FB, 11),
    (0xFF9, 12), (0xFFB, 12), (0x1FF8, 13), (0x1FFB, 13), (0x3FF8, 14), (0x3FF9, 14),
    (0xFFF1, 16), (0xFFF2, 16), (0x1FFEA, 17), (0x1FFEB, 17), (0x3FFE1, 18), (0x3FFE2, 18),
    (0x3FFEA, 18), (0x3FFE3, 18), (0x3FFE6, 18), (0x3FFE7, 18), (0x3FFEB, 18), (0xFFFE6, 20),
    (0x7FFE2, 19), (0xFFFE7, 20), (0xFFFE8, 20), (0xFFFE9, 20), (0xFFFEA, 20), (0xFFFEB, 20),
    (0xFFFEC, 20), (0x7FFE3, 19), (0xFFFED, 20), (0xFFFEE, 20), (0xFFFEF, 20), (0xFFFF0, 20),
    (0x7FFE4, 19), (0xFFFF1, 20), (0x3FFEC, 18), (0xFFFF2, 20), (0xFFFF3, 20), (0x7FFE5, 19),
    (0x7FFE6, 19), (0xFFFF4, 20), (0xFFFF5, 20), (0xFFFF6, 20), (0xFFFF7, 20), (0xFFFF8, 20),
    (0xFFFF9, 20), (0xFFFFA, 20), (0xFFFFB, 20), (0xFFFFC, 20), (0xFFFFD, 20), (0xFFFFE, 20),
    (0xFFFFF, 20),
];

#[rustfmt::skip]
pub(super) const T_ENV_BAL_1_5: [(u32, u8); 49] = [
    (0xFFE4, 16), (0xFFE5, 16), (0xFFE6, 16), (0xFFE7, 16), (0xFFE8, 16), (0xFFE9, 16),
    (0xFFEA, 16), (0xFFEB, 16), (0xFFEC, 16), (0xFFED, 16), (0xFFEE, 16), (0xFFEF, 16),
    (0xFFF0, 16), (0xFFF1, 16), (0xFFF2, 16), (0xFFF3, 16), (0xFFF4, 16), (0xFFE2, 16),
    (0xFFC, 12), (0x7FC, 11), (0x1FE, 9), (0x7E, 7), (0x1E, 5), (0x6, 3),
    (0x0, 1), (0x2, 2), (0xE, 4), (0x3E, 6), (0xFE, 8), (0x7FD, 11),
    (0xFFD, 12), (0x7FF0, 15), (0xFFE3, 16), (0xFFF5, 16), (0xFFF6, 16), (0xFFF7, 16),
    (0xFFF8, 16), (0xFFF9, 16), (0xFFFA, 16), (0x1FFF6, 17), (0x1FFF7, 17), (0x1FFF8, 17),
    (0x1FFF9, 17), (0x1FFFA, 17), (0x1FFFB, 17), (0x1FFFC, 17), (0x1FFFD, 17), (0x1FFFE, 17),
    (0x1FFFF, 17),
];

#[rustfmt::skip]
pub(super) const F_ENV_BAL_1_5: [(u32, u8); 49] = [
    (0x3FFE2, 18), (0x3FFE3, 18), (0x3FFE4, 18), (0x3FFE5, 18), (0x3FFE6, 18), (0x3FFE7, 18),
    (0x3FFE8, 18), (0x3FFE9, 18), (0x3FFEA, 18), (0x3FFEB, 18), (0x3FFEC, 18), (0x3FFED, 18),
    (0x3FFEE, 18), (0x3FFEF, 18), (0x3FFF0, 18), (0xFFF7, 16), (0x1FFF0, 17), (0x3FFC, 14),
    (0x7FE, 11), (0x7FC, 11), (0xFE, 8), (0x7E, 7), (0xE, 4), (0x2, 2),
    (0x0, 1), (0x6, 3), (0x1E, 5), (0x3E, 6), (0x1FE, 9), (0x7FD, 11),
    (0xFFE, 12), (0x7FFA, 15), (0xFFF6, 16), (0x3FFF1, 18), (0x3FFF2, 18), (0x3FFF3, 18),
    (0x3FFF4, 18), (0x3FFF5, 18), (0x3FFF6, 18), (0x3FFF7, 18), (0x3FFF8, 18), (0x3FFF9, 18),
    (0x3FFFA, 18), (0x3FFFB, 18), (0x3FFFC, 18), (0x3FFFD, 18), (0x3FFFE, 18), (0x7FFFE, 19),
    (0x7FFFF, 19),
];

#[rustfmt::skip]
pub(super) const T_ENV_3_0: [(u32, u8); 63] = [
    (0x3FFED, 18), (0x3FFEE, 18), (0x7FFDE, 19), (0x7FFDF, 19), (0x7FFE0, 19), (0x7FFE1, 19),
    (0x7FFE2, 19), (0x7FFE3, 19), (0x7FFE4, 19), (0x7FFE5, 19), (0x7FFE6, 19), (0x7FFE7, 19),
    (0x7FFE8, 19), (0x7FFE9, 19), (0x7FFEA, 19), (0x7FFEB, 19), (0x7FFEC, 19), (0x1FFF4, 17),
    (0xFFF7, 16), (0xFFF9, 16), (0xFFF8, 16), (0x3FFB, 14), (0x3FFA, 14), (0x3FF8, 14),
    (0x1FFA, 13), (0xFFC, 12), (0x7FC, 11), (0xFE, 8), (0x3E, 6), (0xE, 4),
    (0x2, 2), (0x0, 1), (0x6, 3), (0x1E, 5), (0x7E, 7), (0x1FE, 9),
    (0x7FD, 11), (0x1FFB, 13), (0x3FF9, 14), (0x3FFC, 14), (0x7FFA, 15), (0xFFF6, 16),
    (0x1FFF5, 17), (0x3FFEC, 18), (0x7FFED, 19), (0x7FFEE, 19), (0x7FFEF, 19), (0x7FFF0, 19),
    (0x7FFF1, 19), (0x7FFF2, 19), (0x7FFF3, 19), (0x7FFF4, 19), (0x7FFF5, 19), (0x7FFF6, 19),
    (0x7FFF7, 19), (0x7FFF8, 19), (0x7FFF9, 19), (0x7FFFA, 19), (0x7FFFB, 19), (0x7FFFC, 19),
    (0x7FFFD, 19), (0x7FFFE, 19), (0x7FFFF, 19),
];

#[rustfmt::skip]
pub(super) const F_ENV_3_0: [(u32, u8); 63] = [
    (0xFFFF0, 20), (0xFFFF1, 20), (0xFFFF2, 20), (0xFFFF3, 20), (0xFFFF4, 20), (0xFFFF5, 20),
    (0xFFFF6, 20), (0x3FFF3, 18), (0x7FFF5, 19), (0x7FFEE, 19), (0x7FFEF, 19), (0x7FFF6, 19),
    (0x3FFF4, 18), (0x3FFF2, 18), (0xFFFF7, 20), (0x7FFF0, 19), (0x1FFF5, 17), (0x3FFF0, 18),
    (0x1FFF4, 17), (0xFFF7, 16), (0xFFF6, 16), (0x7FF8, 15), (0x3FFB, 14), (0xFFD, 12),
    (0x7FD, 11), (0x3FD, 10), (0x1FD, 9), (0xFD, 8), (0x3E, 6), (0xE, 4),
    (0x2, 2), (0x0, 1), (0x6, 3), (0x1E, 5), (0xFC, 8), (0x1FC, 9),
    (0x3FC, 10), (0x7FC, 11), (0xFFC, 12), (0x1FFC, 13), (0x3FFA, 14), (0x7FF9, 15),
    (0x7FFA, 15), (0xFFF8, 16), (0xFFF9, 16), (0x1FFF6, 17), (0x1FFF7, 17), (0x3FFF5, 18),
    (0x3FFF6, 18), (0x3FFF1, 18), (0xFFFF8, 20), (0x7FFF1, 19), (0x7FFF2, 19), (0x7FFF3, 19),
    (0xFFFF9, 20), (0x7FFF7, 19), (0x7FFF4, 19), (0xFFFFA, 20), (0xFFFFB, 20), (0xFFFFC, 20),
    (0xFFFFD, 20), (0xFFFFE, 20), (0xFFFFF, 20),
];

// 平衡包络 3.0dB, 时间与频率方向共用
#[rustfmt::skip]
pub(super) const T_ENV_BAL_3_0: [(u32, u8); 25] = [
    (0x1FF2, 13), (0x1FF3, 13), (0x1FF4, 13), (0x1FF5, 13), (0x1FF6, 13), (0x1FF7, 13),
    (0x1FF8, 13), (0xFF8, 12), (0xFE, 8), (0x7E, 7), (0xE, 4), (0x6, 3),
    (0x0, 1), (0x2, 2), (0x1E, 5), (0x3E, 6), (0x1FE, 9), (0x1FF9, 13),
    (0x1FFA, 13), (0x1FFB, 13), (0x1FFC, 13), (0x1FFD, 13), (0x1FFE, 13), (0x3FFE, 14),
    (0x3FFF, 14),
];

#[rustfmt::skip]
pub(super) const T_NOISE_3_0: [(u32, u8); 63] = [
    (0x1FCE, 13), (0x1FCF, 13), (0x1FD0, 13), (0x1FD1, 13), (0x1FD2, 13), (0x1FD3, 13),
    (0x1FD4, 13), (0x1FD5, 13), (0x1FD6, 13), (0x1FD7, 13), (0x1FD8, 13), (0x1FD9, 13),
    (0x1FDA, 13), (0x1FDB, 13), (0x1FDC, 13), (0x1FDD, 13), (0x1FDE, 13), (0x1FDF, 13),
    (0x1FE0, 13), (0x1FE1, 13), (0x1FE2, 13), (0x1FE3, 13), (0x1FE4, 13), (0x1FE5, 13),
    (0x1FE6, 13), (0x1FE7, 13), (0x7F2, 11), (0xFD, 8), (0x3E, 6), (0xE, 4),
    (0x6, 3), (0x0, 1), (0x2, 2), (0x1E, 5), (0xFC, 8), (0x3F8, 10),
    (0x1FCC, 13), (0x1FE8, 13), (0x1FE9, 13), (0x1FEA, 13), (0x1FEB, 13), (0x1FEC, 13),
    (0x1FCD, 13), (0x1FED, 13), (0x1FEE, 13), (0x1FEF, 13), (0x1FF0, 13), (0x1FF1, 13),
    (0x1FF2, 13), (0x1FF3, 13), (0x1FF4, 13), (0x1FF5, 13), (0x1FF6, 13), (0x1FF7, 13),
    (0x1FF8, 13), (0x1FF9, 13), (0x1FFA, 13), (0x1FFB, 13), (0x1FFC, 13), (0x1FFD, 13),
    (0x1FFE, 13), (0x3FFE, 14), (0x3FFF, 14),
];

#[rustfmt::skip]
pub(super) const T_NOISE_BAL_3_0: [(u32, u8); 25] = [
    (0xEC, 8), (0xED, 8), (0xEE, 8), (0xEF, 8), (0xF0, 8), (0xF1, 8),
    (0xF2, 8), (0xF3, 8), (0xF4, 8), (0xF5, 8), (0x1C, 5), (0x2, 2),
    (0x0, 1), (0x6, 3), (0x3A, 6), (0xF6, 8), (0xF7, 8), (0xF8, 8),
    (0xF9, 8), (0xFA, 8), (0xFB, 8), (0xFC, 8), (0xFD, 8), (0xFE, 8),
    (0xFF, 8),
];

// PS 强度差 细量化
#[rustfmt::skip]
pub(super) const IID_DF_FINE: [(u32, u8); 61] = [
    (0x1FEB4, 18), (0x1FEB5, 18), (0x1FD76, 18), (0x1FD77, 18), (0x1FD74, 18), (0x1FD75, 18),
    (0x1FE8A, 18), (0x1FE8B, 18), (0x1FE88, 18), (0xFE80, 17), (0x1FEB6, 18), (0xFE82, 17),
    (0xFEB8, 17), (0x7F42, 16), (0x7FAE, 16), (0x3FAF, 15), (0x1FD1, 14), (0x1FE9, 14),
    (0xFE9, 13), (0x7EA, 12), (0x7FB, 12), (0x3FB, 11), (0x1FB, 10), (0x1FF, 10),
    (0x7C, 8), (0x3C, 7), (0x1C, 6), (0xC, 5), (0x0, 4), (0x1, 3),
    (0x1, 1), (0x2, 3), (0x1, 4), (0xD, 5), (0x1D, 6), (0x3D, 7),
    (0x7D, 8), (0xFC, 9), (0x1FC, 10), (0x3FC, 11), (0x3F4, 11), (0x7EB, 12),
    (0xFEA, 13), (0x1FEA, 14), (0x1FD6, 14), (0x3FD0, 15), (0x7FAF, 16), (0x7F43, 16),
    (0xFEB9, 17), (0xFE83, 17), (0x1FEB7, 18), (0xFE81, 17), (0x1FE89, 18), (0x1FE8E, 18),
    (0x1FE8F, 18), (0x1FE8C, 18), (0x1FE8D, 18), (0x1FEB2, 18), (0x1FEB3, 18), (0x1FEB0, 18),
    (0x1FEB1, 18),
];

#[rustfmt::skip]
pub(super) const IID_DT_FINE: [(u32, u8); 61] = [
    (0x4ED4, 16), (0x4ED5, 16), (0x4ECE, 16), (0x4ECF, 16), (0x4ECC, 16), (0x4ED6, 16),
    (0x4ED8, 16), (0x4F46, 16), (0x4F60, 16), (0x2718, 15), (0x2719, 15), (0x2764, 15),
    (0x2765, 15), (0x276D, 15), (0x27B1, 15), (0x138D, 14), (0x13D6, 14), (0x9C7, 13),
    (0x9E9, 13), (0x9ED, 13), (0x4EE, 12), (0x4F7, 12), (0x278, 11), (0x139, 10),
    (0x9A, 9), (0x9F, 9), (0x20, 7), (0x11, 6), (0xA, 5), (0x3, 3),
    (0x1, 1), (0x0, 2), (0xB, 5), (0x12, 6), (0x21, 7), (0x4C, 8),
    (0x9B, 9), (0x13A, 10), (0x279, 11), (0x270, 11), (0x4EF, 12), (0x4E2, 12),
    (0x9EA, 13), (0x9D8, 13), (0x13D7, 14), (0x13D0, 14), (0x27B2, 15), (0x27B3, 15),
    (0x276E, 15), (0x276F, 15), (0x4F61, 16), (0x4F47, 16), (0x4ED9, 16), (0x4ED7, 16),
    (0x4ECD, 16), (0x4ED2, 16), (0x4ED3, 16), (0x4ED0, 16), (0x4ED1, 16), (0x4F44, 16),
    (0x4F45, 16),
];

// PS 强度差 粗量化
#[rustfmt::skip]
pub(super) const IID_DF_COARSE: [(u32, u8); 29] = [
    (0x1FFFB, 17), (0x1FFFC, 17), (0x1FFFD, 17), (0x1FFFA, 17), (0xFFFC, 16), (0x7FFC, 15),
    (0x1FFD, 13), (0x3FE, 10), (0x1FE, 9), (0x7E, 7), (0x3C, 6), (0x1D, 5),
    (0xD, 4), (0x5, 3), (0x0, 1), (0x4, 3), (0xC, 4), (0x1C, 5),
    (0x3D, 6), (0x3E, 6), (0xFE, 8), (0x7FE, 11), (0x1FFC, 13), (0x3FFC, 14),
    (0x3FFD, 14), (0x7FFD, 15), (0x1FFFE, 17), (0x3FFFE, 18), (0x3FFFF, 18),
];

#[rustfmt::skip]
pub(super) const IID_DT_COARSE: [(u32, u8); 29] = [
    (0x7FFF9, 19), (0x7FFFA, 19), (0x7FFFB, 19), (0xFFFF8, 20), (0xFFFF9, 20), (0xFFFFA, 20),
    (0x1FFFD, 17), (0x7FFE, 15), (0xFFE, 12), (0x3FE, 10), (0xFE, 8), (0x3E, 6),
    (0xE, 4), (0x2, 2), (0x0, 1), (0x6, 3), (0x1E, 5), (0x7E, 7),
    (0x1FE, 9), (0x7FE, 11), (0x1FFE, 13), (0x3FFE, 14), (0x1FFFC, 17), (0x7FFF8, 19),
    (0xFFFFB, 20), (0xFFFFC, 20), (0xFFFFD, 20), (0xFFFFE, 20), (0xFFFFF, 20),
];

// PS 相关度
#[rustfmt::skip]
pub(super) const ICC_DF: [(u32, u8); 15] = [
    (0x3FFF, 14), (0x3FFE, 14), (0xFFE, 12), (0x3FE, 10), (0x7E, 7), (0x1E, 5),
    (0x6, 3), (0x0, 1), (0x2, 2), (0xE, 4), (0x3E, 6), (0xFE, 8),
    (0x1FE, 9), (0x7FE, 11), (0x1FFE, 13),
];

#[rustfmt::skip]
pub(super) const ICC_DT: [(u32, u8); 15] = [
    (0x3FFE, 14), (0x1FFE, 13), (0x7FE, 11), (0x1FE, 9), (0x7E, 7), (0x1E, 5),
    (0x6, 3), (0x0, 1), (0x2, 2), (0xE, 4), (0x3E, 6), (0xFE, 8),
    (0x3FE, 10), (0xFFE, 12), (0x3FFF, 14),
];

// PS 相位差, 只解析不合成
#[rustfmt::skip]
pub(super) const IPD_DF: [(u32, u8); 8] = [
    (0x1, 1), (0x0, 3), (0x6, 4), (0x4, 4), (0x2, 4), (0x3, 4),
    (0x5, 4), (0x7, 4),
];

#[rustfmt::skip]
pub(super) const IPD_DT: [(u32, u8); 8] = [
    (0x1, 1), (0x2, 3), (0x2, 4), (0x3, 5), (0x2, 5), (0x0, 4),
    (0x3, 4), (0x3, 3),
];

#[rustfmt::skip]
pub(super) const OPD_DF: [(u32, u8); 8] = [
    (0x1, 1), (0x1, 3), (0x6, 4), (0x4, 4), (0xF, 5), (0xE, 5),
    (0x5, 4), (0x0, 3),
];

#[rustfmt::skip]
pub(super) const OPD_DT: [(u32, u8); 8] = [
    (0x1, 1), (0x2, 3), (0x1, 4), (0x7, 5), (0x6, 5), (0x0, 4),
    (0x2, 4), (0x3, 3),
];

/// 带偏移的差分码本
pub(super) struct Codebook {
    vlc: Vlc,
    offset: i32,
}

impl Codebook {
    fn build(table: &[(u32, u8)], offset: i32) -> Self {
        let entries: Vec<(u32, u8, u16)> = table
            .iter()
            .enumerate()
            .map(|(symbol, &(code, len))| (code, len, symbol as u16))
            .collect();
        Self {
            vlc: Vlc::new(&entries, ROOT_BITS),
            offset,
        }
    }

    pub(super) fn decode(&self, br: &mut BitReader) -> AacResult<i32> {
        Ok(i32::from(self.vlc.decode(br)?) - self.offset)
    }
}

/// 包络与噪声码本, 按量化精度分组
pub(super) struct SbrCodebooks {
    pub env_1_5: [Codebook; 2],
    pub env_bal_1_5: [Codebook; 2],
    pub env_3_0: [Codebook; 2],
    pub env_bal_3_0: [Codebook; 2],
    pub noise: Codebook,
    pub noise_bal: Codebook,
}

/// PS 参数码本; `[频率差分, 时间差分]`
pub(super) struct PsCodebooks {
    pub iid_coarse: [Codebook; 2],
    pub iid_fine: [Codebook; 2],
    pub icc: [Codebook; 2],
    pub ipd: [Codebook; 2],
    pub opd: [Codebook; 2],
}

static SBR_CODEBOOKS: LazyLock<SbrCodebooks> = LazyLock::new(|| SbrCodebooks {
    env_1_5: [Codebook::build(&F_ENV_1_5, 60), Codebook::build(&T_ENV_1_5, 60)],
    env_bal_1_5: [
        Codebook::build(&F_ENV_BAL_1_5, 24),
        Codebook::build(&T_ENV_BAL_1_5, 24),
    ],
    env_3_0: [Codebook::build(&F_ENV_3_0, 31), Codebook::build(&T_ENV_3_0, 31)],
    env_bal_3_0: [
        Codebook::build(&T_ENV_BAL_3_0, 12),
        Codebook::build(&T_ENV_BAL_3_0, 12),
    ],
    noise: Codebook::build(&T_NOISE_3_0, 31),
    noise_bal: Codebook::build(&T_NOISE_BAL_3_0, 12),
});

static PS_CODEBOOKS: LazyLock<PsCodebooks> = LazyLock::new(|| PsCodebooks {
    iid_coarse: [
        Codebook::build(&IID_DF_COARSE, 14),
        Codebook::build(&IID_DT_COARSE, 14),
    ],
    iid_fine: [
        Codebook::build(&IID_DF_FINE, 30),
        Codebook::build(&IID_DT_FINE, 30),
    ],
    icc: [Codebook::build(&ICC_DF, 7), Codebook::build(&ICC_DT, 7)],
    ipd: [Codebook::build(&IPD_DF, 0), Codebook::build(&IPD_DT, 0)],
    opd: [Codebook::build(&OPD_DF, 0), Codebook::build(&OPD_DT, 0)],
});

pub(super) fn sbr_codebooks() -> &'static SbrCodebooks {
    &SBR_CODEBOOKS
}

pub(super) fn ps_codebooks() -> &'static PsCodebooks {
    &PS_CODEBOOKS
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aacdec_core::bitwriter::BitWriter;

    const ALL: [(&str, &[(u32, u8)]); 19] = [
        ("t_env_1_5", &T_ENV_1_5),
        ("f_env_1_5", &F_ENV_1_5),
        ("t_env_bal_1_5", &T_ENV_BAL_1_5),
        ("f_env_bal_1_5", &F_ENV_BAL_1_5),
        ("t_env_3_0", &T_ENV_3_0),
        ("f_env_3_0", &F_ENV_3_0),
        ("env_bal_3_0", &T_ENV_BAL_3_0),
        ("t_noise_3_0", &T_NOISE_3_0),
        ("t_noise_bal_3_0", &T_NOISE_BAL_3_0),
        ("iid_df_fine", &IID_DF_FINE),
        ("iid_dt_fine", &IID_DT_FINE),
        ("iid_df_coarse", &IID_DF_COARSE),
        ("iid_dt_coarse", &IID_DT_COARSE),
        ("icc_df", &ICC_DF),
        ("icc_dt", &ICC_DT),
        ("ipd_df", &IPD_DF),
        ("ipd_dt", &IPD_DT),
        ("opd_df", &OPD_DF),
        ("opd_dt", &OPD_DT),
    ];

    /// 写出值 `value` (已含偏移) 对应的码字, 测试构造码流用
    pub(crate) fn write_value(bw: &mut BitWriter, table: &[(u32, u8)], offset: i32, value: i32) {
        let (code, len) = table[(value + offset) as usize];
        bw.write_bits(code, u32::from(len));
    }

    #[test]
    fn test_码本完备且无前缀冲突() {
        for (name, table) in ALL {
            let mut kraft = 0u64;
            for &(code, len) in table {
                assert!(code < (1 << len), "{name}: 码字超出码长");
                kraft += 1u64 << (24 - u32::from(len));
            }
            assert_eq!(kraft, 1 << 24, "{name}: Kraft 和不为 1");

            let mut words: Vec<String> = table
                .iter()
                .map(|&(code, len)| format!("{code:0width$b}", width = usize::from(len)))
                .collect();
            words.sort();
            for pair in words.windows(2) {
                assert!(!pair[1].starts_with(&pair[0]), "{name}: {} 是 {} 的前缀", pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn test_零差分为最短码() {
        let books = sbr_codebooks();
        let mut bw = BitWriter::new();
        write_value(&mut bw, &F_ENV_1_5, 60, 0);
        write_value(&mut bw, &T_NOISE_3_0, 31, -3);
        write_value(&mut bw, &F_ENV_1_5, 60, 7);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(books.env_1_5[0].decode(&mut br).unwrap(), 0);
        assert_eq!(books.noise.decode(&mut br).unwrap(), -3);
        assert_eq!(books.env_1_5[0].decode(&mut br).unwrap(), 7);
        assert_eq!(u32::from(F_ENV_1_5[60].1), 2);
    }
}

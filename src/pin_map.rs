use derive_try_from_primitive::TryFromPrimitive;

/// Mapping from physical positions on the 40-pin header of Orange Pi PC class boards to H3 PIO
/// pin numbers (`port * 32 + index`, ports counted from PA).
///
/// The most important usage of this enum is to tell [`crate::OutputDevice`] which pin it drives.
#[repr(u8)]
#[derive(TryFromPrimitive, Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PinId {
    Phy7 = 6,    // PA6
    Phy8 = 13,   // PA13
    Phy10 = 14,  // PA14
    Phy11 = 1,   // PA1
    Phy12 = 110, // PD14
    Phy13 = 0,   // PA0
    Phy15 = 3,   // PA3
    Phy16 = 68,  // PC4
    Phy18 = 71,  // PC7
    Phy19 = 64,  // PC0
    Phy21 = 65,  // PC1
    Phy22 = 2,   // PA2
    Phy23 = 66,  // PC2
    Phy24 = 67,  // PC3
    Phy26 = 21,  // PA21
    Phy27 = 19,  // PA19
    Phy28 = 18,  // PA18
    Phy29 = 7,   // PA7
    Phy31 = 8,   // PA8
    Phy32 = 200, // PG8
    Phy33 = 9,   // PA9
    Phy35 = 10,  // PA10
    Phy36 = 201, // PG9
    Phy37 = 20,  // PA20
    Phy38 = 198, // PG6
    Phy40 = 199, // PG7
}

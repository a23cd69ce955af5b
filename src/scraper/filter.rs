//! Commercial-vehicle filter.
//!
//! Trucks, buses, tractors and motorcycles do not exist in the advisor's
//! car catalog, so they are skipped before any external call is made.

/// Brands that are primarily commercial or industrial.
const COMMERCIAL_BRANDS: [&str; 36] = [
    // Truck manufacturers
    "scania",
    "daf",
    "man",
    "iveco",
    "international",
    "navistar",
    "freightliner",
    "kenworth",
    "peterbilt",
    "hino",
    "isuzu trucks",
    "ud trucks",
    "fuso",
    // Industrial / agricultural equipment
    "atlas copco",
    "caterpillar",
    "komatsu",
    "jcb",
    "bobcat",
    "case",
    "new holland",
    "massey ferguson",
    "john deere",
    "valtra",
    "agrale",
    "cummins",
    "perkins",
    "deutz",
    // Motorcycle brands; the car makers stay qualified so Honda/Suzuki/BMW
    // passenger cars pass through
    "yamaha",
    "honda motos",
    "suzuki motos",
    "kawasaki",
    "harley",
    "bmw motorrad",
    "ducati",
    "triumph",
    "ktm",
];

/// Model and description fragments that identify commercial vehicles,
/// including the numeric truck designations ("17.280" and friends).
const COMMERCIAL_PATTERNS: [&str; 121] = [
    // Truck model names
    "cargo",
    "constellation",
    "worker",
    "delivery",
    "fh ",
    "fh-",
    "fm ",
    "fm-",
    "fmx",
    "vm ",
    "vm-",
    "axor",
    "atego",
    "actros",
    "arocs",
    "stralis",
    "trakker",
    "eurocargo",
    "serie p",
    "serie g",
    "serie r",
    "serie s",
    // Bus models and body builders
    "of-",
    "volare",
    "busscar",
    "mascarello",
    "marcopolo",
    "neobus",
    "caio",
    "comil",
    // Tractors / agricultural
    "trator",
    "colheitadeira",
    "retroescavadeira",
    "mf ",
    "massey",
    "new holland",
    "case ih",
    "john deere",
    "valtra",
    // Heavy equipment
    "escavadeira",
    "pa carregadeira",
    "motoniveladora",
    "rolo compactador",
    "guindaste",
    "empilhadeira",
    "compressor",
    "gerador",
    // Ford trucks
    "f-350",
    "f-4000",
    "f-14000",
    "f350",
    "f4000",
    "f14000",
    "fb4000",
    "fb-4000",
    "f 4000",
    "fb 4000",
    // Chevrolet / GM trucks
    "d-20",
    "d20",
    "d-40",
    "d40",
    "d-60",
    "d60",
    "c-10",
    "c10",
    "c-60",
    "c60",
    "c-15",
    "c15",
    // VW trucks (numeric designations)
    "5.140",
    "6.80",
    "6.90",
    "7.90",
    "7.100",
    "7.110",
    "7.120",
    "8.120",
    "8.140",
    "8.150",
    "8.160",
    "9.150",
    "9.170",
    "10.160",
    "11.130",
    "11.180",
    "12.140",
    "13.150",
    "13.180",
    "15.170",
    "15.180",
    "15.190",
    "16.200",
    "17.180",
    "17.190",
    "17.210",
    "17.220",
    "17.230",
    "17.250",
    "17.280",
    "17.310",
    "18.310",
    "19.320",
    "19.330",
    "19.360",
    "19.390",
    "19.420",
    "23.210",
    "23.220",
    "23.230",
    "23.250",
    "23.310",
    "24.250",
    "24.280",
    "24.310",
    "25.320",
    "25.360",
    "25.390",
    "25.420",
    "26.260",
    "furgovan",
    "kombi furgao",
];

/// Whether the vehicle belongs to the commercial segment the crawler skips.
pub fn is_commercial_vehicle(brand: &str, model: &str, description: &str) -> bool {
    let brand_lower = brand.to_lowercase();
    if COMMERCIAL_BRANDS.iter().any(|b| brand_lower.contains(b)) {
        return true;
    }

    let combined = format!("{} {}", model.to_lowercase(), description.to_lowercase());
    COMMERCIAL_PATTERNS.iter().any(|p| combined.contains(p))
}

/// Heartbeat classes of the 1-D ECG classifier, in output order.
pub const ECG_CLASSES: [&str; 5] = [
    "Normal Sinus Rhythm",
    "Supraventricular (S) - Tachycardia Indication",
    "Ventricular Ectopic (V) - Abnormal",
    "Fusion Beat (F)",
    "Normal Sinus Rhythm with Artefacts",
];

pub fn ecg_explanation(class_index: usize) -> &'static str {
    match class_index {
        0 => "Normal heartbeat. The P-QRS-T waveform is regular and stable.",
        1 => "Supraventricular (S) indication. An abnormally fast rhythm originating in the atria.",
        2 => "Ventricular ectopic (V) indication. A premature ventricular contraction, often called an extrasystole.",
        3 => "Fusion beat. Normal and abnormal electrical impulses occurring at the same time.",
        _ => "The heartbeat pattern looks largely normal.",
    }
}

pub const BONE_CLASSES: [&str; 10] = [
    "Healthy",
    "Fracture",
    "Avulsion",
    "Comminuted",
    "Greenstick",
    "Hairline",
    "Impacted",
    "Longitudinal",
    "Oblique",
    "Spiral",
];

pub const SKIN_CLASSES: [&str; 2] = ["Healthy Skin", "Scabies"];

pub const SCABIES_DESCRIPTION: &str =
    "Scabies is a contagious skin condition caused by the Sarcoptes scabiei mite.";

pub const SCABIES_TREATMENT: &str = "1. Permethrin 5% cream.\n2. Wash clothing and bedding in hot water.\n3. Avoid direct skin contact until treated.";

pub const NO_TUMOR: &str = "No Tumor";

/// True for detector labels such as `no_tumor`, `No Tumor` or `no-tumor`.
pub fn is_no_tumor(label: &str) -> bool {
    let folded: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    folded == "notumor"
}

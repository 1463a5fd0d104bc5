use lazy_static::lazy_static;

pub const CONDITION_COUNT: usize = 8;
pub const HEALTHY_CLASS_ID: usize = 0;

/// One target class of the ODIR-5K retinal taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionClass {
    pub id: usize,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    pub recommendations: &'static [&'static str],
}

impl ConditionClass {
    pub fn is_healthy(&self) -> bool {
        self.id == HEALTHY_CLASS_ID
    }

    fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
    }
}

lazy_static! {
    pub static ref CONDITIONS: Vec<ConditionClass> = vec![
        ConditionClass {
            id: 0,
            name: "Normal (Healthy)",
            aliases: &["Normal", "Healthy"],
            description: "Retina appears healthy with no signs of pathology. Clear optic disc and macula.",
            recommendations: &[
                "Continue regular eye examinations every 1-2 years",
                "Maintain healthy lifestyle and balanced diet",
                "Protect eyes from UV exposure with quality sunglasses",
                "Monitor for any vision changes",
            ],
        },
        ConditionClass {
            id: 1,
            name: "Diabetic Retinopathy",
            aliases: &["DR"],
            description: "Blood vessel damage in retina caused by diabetes. May show microaneurysms, hemorrhages, or exudates.",
            recommendations: &[
                "Maintain strict blood sugar control (HbA1c < 7%)",
                "Schedule ophthalmologic follow-ups every 3-6 months",
                "Consider anti-VEGF treatment if proliferative",
                "Monitor and control blood pressure (<140/90)",
                "Immediate referral to retinal specialist if severe",
            ],
        },
        ConditionClass {
            id: 2,
            name: "Glaucoma",
            aliases: &[],
            description: "Optic nerve damage often related to increased intraocular pressure. May show cup-to-disc ratio changes.",
            recommendations: &[
                "Use prescribed eye drops consistently as directed",
                "Monitor intraocular pressure every 3-4 months",
                "Regular visual field testing to track progression",
                "Consider laser or surgical intervention if advanced",
                "Avoid activities that increase eye pressure",
            ],
        },
        ConditionClass {
            id: 3,
            name: "Age-related Macular Degeneration (AMD)",
            aliases: &["Age-related Macular Degeneration", "AMD"],
            description: "Deterioration of central retina (macula). May be dry or wet type with drusen deposits.",
            recommendations: &[
                "Take AREDS2 vitamin supplements (if intermediate AMD)",
                "Monitor vision daily with Amsler grid test",
                "Anti-VEGF injections for wet AMD cases",
                "Protect from UV light and blue light exposure",
                "Maintain diet rich in leafy greens and fish",
            ],
        },
        ConditionClass {
            id: 4,
            name: "Cataract",
            aliases: &[],
            description: "Clouding of natural lens causing vision impairment. May appear as lens opacity.",
            recommendations: &[
                "Cataract surgery when vision significantly impaired",
                "Use bright lighting for reading and close work",
                "Update prescription glasses regularly",
                "Consider premium IOL options during surgery",
                "Protect from UV radiation to prevent progression",
            ],
        },
        ConditionClass {
            id: 5,
            name: "Hypertensive Retinopathy",
            aliases: &["Hypertension"],
            description: "Retinal blood vessel changes due to high blood pressure. Shows arteriovenous nicking, hemorrhages.",
            recommendations: &[
                "Achieve target blood pressure <130/80 mmHg",
                "Take antihypertensive medications as prescribed",
                "Reduce sodium intake (<2300mg daily)",
                "Regular cardiovascular system monitoring",
                "Lifestyle modifications: exercise and weight loss",
            ],
        },
        ConditionClass {
            id: 6,
            name: "Myopic Maculopathy",
            aliases: &["Myopia", "Pathological Myopia"],
            description: "Macular changes in high myopia showing retinal thinning, atrophy, or choroidal neovascularization.",
            recommendations: &[
                "Regular monitoring for myopic choroidal neovascularization",
                "Consider anti-VEGF treatment if CNV present",
                "Myopia control in children and young adults",
                "Avoid high-impact activities if severe myopia",
                "Monitor for retinal detachment signs",
            ],
        },
        ConditionClass {
            id: 7,
            name: "Other Abnormalities",
            aliases: &["Other"],
            description: "Various retinal pathologies including retinal detachment, macular holes, or inflammatory conditions.",
            recommendations: &[
                "Immediate ophthalmologic evaluation required",
                "Determine specific pathology through detailed examination",
                "Treatment depends on exact diagnosis",
                "May require surgical intervention",
                "Close monitoring and specialized care needed",
            ],
        },
    ];
}

pub fn condition(id: usize) -> Option<&'static ConditionClass> {
    CONDITIONS.get(id)
}

/// Resolves a free-text condition name (case-insensitive, aliases allowed).
pub fn find_by_name(name: &str) -> Option<&'static ConditionClass> {
    CONDITIONS.iter().find(|condition| condition.matches(name))
}

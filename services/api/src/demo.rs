use std::collections::BTreeMap;
use std::path::PathBuf;

use alternance::config::WorkflowConfig;
use alternance::error::AppError;
use alternance::platform::ServiceError;
use alternance::tenancy::{AccessScope, Role, User, UserDraft};
use alternance::workflows::apprenticeship::tsf::assign_period;
use alternance::workflows::apprenticeship::{
    AttachmentDescriptor, ContractDraft, ContractError, ContractStatus, LivretDraft,
    MasteryLevel, ProofSubmission, ReviewDecision, Signer, TsfGenerator,
};
use alternance::workflows::referentiel::{
    BlocCompetence, Competence, Indicateur, Referentiel, ReferentielDraft, ReferentielHeader,
    ReferentielImporter,
};
use chrono::{Duration, Local, NaiveDate, Utc};
use clap::Args;

use crate::infra::{platform_service, PlatformService};

#[derive(Args, Debug)]
pub(crate) struct ReferentielInspectArgs {
    /// CSV export with one row per indicator
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// RNCP code of the certification (e.g. RNCP37873)
    #[arg(long)]
    pub(crate) rncp_code: String,
    /// Certification title
    #[arg(long)]
    pub(crate) title: String,
    #[arg(long)]
    pub(crate) level: Option<u8>,
}

#[derive(Args, Debug)]
pub(crate) struct TsfPreviewArgs {
    /// Contract start date (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start: NaiveDate,
    /// Contract end date (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) end: NaiveDate,
    /// Number of competence blocs to place
    #[arg(long)]
    pub(crate) blocs: usize,
    /// Length of one TSF period in months
    #[arg(long, default_value_t = 6)]
    pub(crate) period_months: u32,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reporting date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Print the audit trail recorded during the walkthrough.
    #[arg(long)]
    pub(crate) show_audit: bool,
}

pub(crate) fn run_referentiel_inspect(args: ReferentielInspectArgs) -> Result<(), AppError> {
    let draft = ReferentielImporter::from_path(
        &args.csv,
        ReferentielHeader {
            rncp_code: args.rncp_code,
            title: args.title,
            level: args.level,
        },
    )?;

    for line in describe_referentiel(&draft) {
        println!("{line}");
    }
    Ok(())
}

fn describe_referentiel(draft: &ReferentielDraft) -> Vec<String> {
    let competences: usize = draft.blocs.iter().map(|bloc| bloc.competences.len()).sum();
    let mut lines = vec![format!(
        "{} - {} ({} blocs, {} competences)",
        draft.rncp_code,
        draft.title,
        draft.blocs.len(),
        competences
    )];
    for bloc in &draft.blocs {
        lines.push(format!("- {} {}", bloc.code, bloc.title));
        for competence in &bloc.competences {
            lines.push(format!(
                "    {} {} ({} indicateurs)",
                competence.code,
                competence.title,
                competence.indicateurs.len()
            ));
        }
    }
    lines
}

pub(crate) fn run_tsf_preview(args: TsfPreviewArgs) -> Result<(), AppError> {
    for line in preview_lines(&args)? {
        println!("{line}");
    }
    Ok(())
}

fn preview_lines(args: &TsfPreviewArgs) -> Result<Vec<String>, AppError> {
    if args.end <= args.start {
        return Err(ServiceError::from(ContractError::InvalidDates {
            start: args.start,
            end: args.end,
        })
        .into());
    }
    let periods = TsfGenerator::new(args.period_months)
        .slice(args.start, args.end)
        .map_err(ServiceError::from)?;

    let mut placed: Vec<Vec<usize>> = vec![Vec::new(); periods.len()];
    for bloc in 0..args.blocs {
        placed[assign_period(bloc, args.blocs, periods.len())].push(bloc + 1);
    }

    let mut lines = vec![format!(
        "{} periods of {} months between {} and {}",
        periods.len(),
        args.period_months,
        args.start,
        args.end
    )];
    for (index, ((start, end), blocs)) in periods.iter().zip(placed).enumerate() {
        let blocs = if blocs.is_empty() {
            "no bloc".to_string()
        } else {
            blocs
                .iter()
                .map(|bloc| format!("BC{bloc:02}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        lines.push(format!("P{} {} -> {}: {}", index + 1, start, end, blocs));
    }
    Ok(lines)
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let service = platform_service(WorkflowConfig::default());

    println!("Apprenticeship walkthrough ({today})");
    let tenant = service.create_tenant("CFA de démonstration", "cfa-demo", None)?;
    let admin = scope(&service, &tenant.id, "direction@cfa-demo.fr", "Direction", Role::Admin)?;
    let formateur = scope(
        &service,
        &tenant.id,
        "formateur@cfa-demo.fr",
        "Hugo Formateur",
        Role::Formateur,
    )?;
    let tuteur = scope(
        &service,
        &tenant.id,
        "tuteur@atelier.fr",
        "Paul Tuteur",
        Role::Tuteur,
    )?;
    let apprenti = scope(
        &service,
        &tenant.id,
        "apprentie@mail.fr",
        "Lina Apprentie",
        Role::Apprenti,
    )?;
    println!("- tenant {} with four users", tenant.slug);

    let referentiel = service.create_referentiel(&admin, demo_referentiel())?;
    println!(
        "- referential {} ({} competences)",
        referentiel.rncp_code,
        referentiel.competence_count()
    );

    let contract = service.create_contract(
        &formateur,
        ContractDraft {
            external_id: Some("OPCO-DEMO-1".to_string()),
            apprentice_id: apprenti.user_id.clone(),
            tutor_id: tuteur.user_id.clone(),
            referent_id: formateur.user_id.clone(),
            referentiel_id: referentiel.id.clone(),
            company_name: "Atelier Logiciel SAS".to_string(),
            start_date: today - Duration::days(90),
            end_date: today + Duration::days(640),
        },
    )?;
    let contract = service.transition_contract(&formateur, &contract.id, ContractStatus::Active)?;
    println!(
        "- contract {} at {} is {}",
        contract.id,
        contract.company_name,
        contract.status.label()
    );

    let levels = positioning_levels(&referentiel);
    service.record_positioning(&formateur, &contract.id, levels)?;
    let progression = service.progression(&formateur, &contract.id)?;
    println!(
        "- positioning: {}/{} competences acquired",
        progression.acquired, progression.total
    );

    service.generate_tsf(&formateur, &contract.id)?;
    let tsf = service.validate_tsf(&formateur, &contract.id)?;
    println!(
        "- TSF validated: {} periods, {} competences scheduled, already acquired {:?}",
        tsf.periods.len(),
        tsf.scheduled_competences(),
        tsf.already_acquired
    );

    let proof = service.submit_proof(
        &apprenti,
        &contract.id,
        ProofSubmission {
            title: "Mise en production du portail client".to_string(),
            description: "Pipeline de déploiement et supervision".to_string(),
            competence_codes: vec!["C2.1".to_string()],
            attachment: Some(AttachmentDescriptor {
                file_name: "compte-rendu.pdf".to_string(),
                content_type: None,
                size_bytes: 84_000,
            }),
        },
    )?;
    let proof = service.review_proof(&tuteur, &proof.id, ReviewDecision::Validate, None)?;
    println!("- proof '{}' {}", proof.title, proof.status.label());

    let livret = service.create_livret(
        &formateur,
        &contract.id,
        LivretDraft {
            period_label: "Trimestre 1".to_string(),
            period_start: contract.start_date,
            period_end: today,
        },
    )?;
    service.sign_livret(&apprenti, &livret.id)?;
    service.sign_livret(&formateur, &livret.id)?;
    let link = service.issue_signing_link(&formateur, &livret.id, Signer::Tutor)?;
    let livret = service.sign_with_token(&link.token, Utc::now())?;
    println!(
        "- livret '{}' {} (tutor signed through a link valid until {})",
        livret.period_label,
        livret.status.label(),
        link.expires_at.format("%Y-%m-%d %H:%M")
    );

    let health = service.contract_health(&formateur, &contract.id, today)?;
    println!("- health score {} ({})", health.score, health.level.label());
    for signal in &health.signals {
        println!("    {} (-{})", signal.label, signal.penalty);
    }

    let report = service.qualiopi_report(&admin, today)?;
    println!(
        "\nQualiopi indicators ({} day window, compliant: {})",
        report.window_days,
        report.is_compliant()
    );
    for indicator in &report.indicators {
        println!(
            "  - {:>2} {}: {}/{} ({:.0}%)",
            indicator.number,
            indicator.label,
            indicator.numerator,
            indicator.denominator,
            indicator.rate * 100.0
        );
    }

    if args.show_audit {
        println!("\nAudit trail");
        for entry in service.audit_log(&admin, None)? {
            println!("  {} {} {}", entry.at.format("%H:%M:%S"), entry.action, entry.resource);
        }
    }

    Ok(())
}

fn scope(
    service: &PlatformService,
    tenant_id: &alternance::ids::TenantId,
    email: &str,
    name: &str,
    role: Role,
) -> Result<AccessScope, ServiceError> {
    let user: User = service.register_user(
        tenant_id,
        UserDraft {
            email: email.to_string(),
            display_name: name.to_string(),
            role,
        },
    )?;
    Ok(AccessScope::new(user.tenant_id, user.id, user.role))
}

/// First competence acquired, the rest still in progress.
fn positioning_levels(referentiel: &Referentiel) -> BTreeMap<String, MasteryLevel> {
    referentiel
        .competences()
        .enumerate()
        .map(|(index, competence)| {
            let level = if index == 0 {
                MasteryLevel::Acquis
            } else {
                MasteryLevel::EnCours
            };
            (competence.code.clone(), level)
        })
        .collect()
}

fn demo_referentiel() -> ReferentielDraft {
    let competence = |code: &str, title: &str, indicateur: &str| Competence {
        code: code.to_string(),
        title: title.to_string(),
        indicateurs: vec![Indicateur {
            code: "I1".to_string(),
            description: indicateur.to_string(),
        }],
    };
    ReferentielDraft {
        rncp_code: "RNCP37873".to_string(),
        title: "Concepteur développeur d'applications".to_string(),
        level: Some(6),
        blocs: vec![
            BlocCompetence {
                code: "BC01".to_string(),
                title: "Concevoir une application".to_string(),
                competences: vec![
                    competence("C1.1", "Analyser le besoin", "Besoin reformulé"),
                    competence("C1.2", "Maquetter les écrans", "Maquette validée"),
                ],
            },
            BlocCompetence {
                code: "BC02".to_string(),
                title: "Développer et déployer".to_string(),
                competences: vec![
                    competence("C2.1", "Déployer une application", "Pipeline opérationnel"),
                    competence("C2.2", "Sécuriser les accès", "Audit sans faille critique"),
                ],
            },
        ],
    }
}

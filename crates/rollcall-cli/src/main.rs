use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rollcall_capture::{ImageSource, IpCameraSource};
use rollcall_service::{spawn_engine, Config, Service};
use rollcall_store::{AttendanceStore, EmbeddingStore, SqliteStore};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-verified classroom attendance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register (or re-register) a student's face from a photo
    Register {
        #[arg(short, long)]
        student_id: String,
        /// Path to the photo
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Verify a photo against a student's registered face
    Verify {
        #[arg(short, long)]
        student_id: String,
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Check in to a session, verifying the face from a photo or a webcam
    CheckIn {
        #[arg(long)]
        session_id: String,
        /// Student email; identity is resolved from the roster
        #[arg(long)]
        email: String,
        #[command(flatten)]
        capture: CaptureArgs,
    },
    /// Stop using a student's registered face for comparison
    Deactivate {
        #[arg(short, long)]
        student_id: String,
    },
    /// List registered faces
    List,
    /// Manage attendance sessions
    #[command(subcommand)]
    Session(SessionCommands),
    /// Manage students and class rosters
    #[command(subcommand)]
    Student(StudentCommands),
}

#[derive(Args)]
struct CaptureArgs {
    /// Path to an already-captured photo
    #[arg(long, conflicts_with = "camera_ip")]
    image: Option<PathBuf>,
    /// IP webcam address to poll for a snapshot
    #[arg(long)]
    camera_ip: Option<String>,
    #[arg(long, default_value_t = 8080)]
    camera_port: u16,
    #[arg(long, requires = "camera_password")]
    camera_user: Option<String>,
    #[arg(long, requires = "camera_user")]
    camera_password: Option<String>,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Open an attendance session for a class
    Create {
        #[arg(long)]
        class_id: String,
        #[arg(long)]
        teacher_email: String,
        #[arg(long)]
        duration_hours: Option<i64>,
        #[arg(long)]
        grace_minutes: Option<i64>,
    },
    /// End a session and mark absentees
    End { session_id: String },
    /// List attendance records for a session
    Records { session_id: String },
}

#[derive(Subcommand)]
enum StudentCommands {
    /// Add a student identity and email
    Add {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        email: String,
    },
    /// Enroll a student in a class roster
    Enroll {
        #[arg(long)]
        class_id: String,
        #[arg(long)]
        student_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let store = SqliteStore::open(&config.db_path)?;

    match cli.command {
        Commands::Register { student_id, image } => {
            let service = face_service(store, &config)?;
            let bytes = read_image(&image)?;
            let outcome = service.register_face(&student_id, bytes).await?;
            print_json(&outcome)?;
        }
        Commands::Verify { student_id, image } => {
            let service = face_service(store, &config)?;
            let bytes = read_image(&image)?;
            let outcome = service.verify_face(&student_id, bytes).await?;
            print_json(&outcome)?;
        }
        Commands::CheckIn { session_id, email, capture } => {
            let service = face_service(store, &config)?;
            let source = capture.into_source(&config)?;
            let outcome = service.check_in(&session_id, &email, &source).await?;
            print_json(&outcome)?;
        }
        Commands::Deactivate { student_id } => {
            store.deactivate(&student_id)?;
            println!("face deactivated for {student_id}");
        }
        Commands::List => {
            print_json(&store.list_registered()?)?;
        }
        Commands::Session(cmd) => match cmd {
            SessionCommands::Create { class_id, teacher_email, duration_hours, grace_minutes } => {
                let session = store.create_session(
                    &class_id,
                    &teacher_email,
                    duration_hours.unwrap_or(config.session_duration_hours),
                    grace_minutes.unwrap_or(config.grace_minutes),
                )?;
                print_json(&session)?;
            }
            SessionCommands::End { session_id } => {
                let absent = store.end_session(&session_id)?;
                println!("session ended; {absent} absent record(s) created");
            }
            SessionCommands::Records { session_id } => {
                print_json(&store.records_for_session(&session_id)?)?;
            }
        },
        Commands::Student(cmd) => match cmd {
            StudentCommands::Add { student_id, email } => {
                store.add_student(&student_id, &email)?;
                println!("student {student_id} added");
            }
            StudentCommands::Enroll { class_id, student_id } => {
                store.enroll_in_class(&class_id, &student_id)?;
                println!("student {student_id} enrolled in {class_id}");
            }
        },
    }

    Ok(())
}

/// Load the models and build the service; only face commands pay this cost.
fn face_service(store: SqliteStore, config: &Config) -> Result<Service<SqliteStore>> {
    let engine = spawn_engine(&config.detector_model_path(), &config.encoder_model_path())?;
    Ok(Service::new(store, engine, config))
}

impl CaptureArgs {
    fn into_source(self, config: &Config) -> Result<ImageSource> {
        if let Some(path) = self.image {
            return Ok(ImageSource::Upload(read_image(&path)?));
        }
        let ip = self
            .camera_ip
            .context("either --image or --camera-ip is required")?;
        let auth = self.camera_user.zip(self.camera_password);
        let camera = IpCameraSource::new(
            &ip,
            self.camera_port,
            auth,
            Duration::from_secs(config.capture_timeout_secs),
        )?;
        Ok(ImageSource::IpCamera(camera))
    }
}

fn read_image(path: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("could not read image {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
